use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration. Every field has a default, so an empty TOML file
/// (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fallback tracing filter when neither `--log-level` nor `RUST_LOG` is set.
    pub log_level: String,
    pub completion: CompletionConfig,
    pub ocr: OcrConfig,
    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            completion: CompletionConfig::default(),
            ocr: OcrConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Remote chat-completion service and sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    /// Upper bound on calling the API and draining its stream.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            api_key: None,
            model: "nvidia/llama-3.1-nemotron-70b-instruct".to_string(),
            system_prompt: "summarize this but don't make it too short".to_string(),
            temperature: 0.8,
            top_p: 1.0,
            max_tokens: 2048,
            timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// External binaries used for scanned pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub tesseract_path: String,
    pub pdftoppm_path: String,
    pub lang: String,
    pub dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".to_string(),
            pdftoppm_path: "pdftoppm".to_string(),
            lang: "eng".to_string(),
            dpi: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10000,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}
