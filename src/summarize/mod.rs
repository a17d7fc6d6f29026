//! Summarize: upload in, summary out
//!
//! Reads text from an uploaded file (OCR for scanned PDF pages), sends it to
//! a chat-completion API and collects the streamed answer.

pub mod schema;
pub mod error;
pub mod pdf;
pub mod ocr;
pub mod extract;
pub mod completion;
pub mod pipeline;

pub use error::SummarizeError;
pub use pipeline::Pipeline;
pub use schema::{Summary, UploadedDocument};
