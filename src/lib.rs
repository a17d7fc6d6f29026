pub mod config;
pub mod doctor;
pub mod gateway;
pub mod summarize;
