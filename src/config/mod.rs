//! Layered configuration: defaults, then a TOML file, then environment.

pub mod schema;

pub use schema::{CompletionConfig, Config, GatewayConfig, OcrConfig};

use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Environment variable {var} has invalid value {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// `<config dir>/docsum/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "docsum")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from an explicit path, or the default path when it exists, then
    /// apply process environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => Some(PathBuf::from(shellexpand::tilde(p).into_owned())),
            None => Self::default_path().filter(|p| p.exists()),
        };

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from environment variables. `lookup` is
    /// `std::env::var` in production.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("NVIDIA_API_BASE_URL") {
            self.completion.base_url = url;
        }
        if let Some(key) = get("API_KEY") {
            self.completion.api_key = Some(key);
        }
        if let Some(model) = get("COMPLETION_MODEL") {
            self.completion.model = model;
        }
        if let Some(path) = get("TESSERACT_PATH") {
            self.ocr.tesseract_path = path;
        }
        if let Some(path) = get("PDFTOPPM_PATH") {
            self.ocr.pdftoppm_path = path;
        }
        if let Some(host) = get("HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = get("PORT") {
            self.gateway.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "PORT",
                    value: port.clone(),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.completion;
        if c.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("completion.base_url is empty".into()));
        }
        if !(0.0..=2.0).contains(&c.temperature) {
            return Err(ConfigError::Invalid(format!(
                "completion.temperature must be within [0, 2], got {}",
                c.temperature
            )));
        }
        if !(c.top_p > 0.0 && c.top_p <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "completion.top_p must be within (0, 1], got {}",
                c.top_p
            )));
        }
        if c.max_tokens == 0 {
            return Err(ConfigError::Invalid("completion.max_tokens must be positive".into()));
        }
        if c.timeout_secs == 0 {
            return Err(ConfigError::Invalid("completion.timeout_secs must be positive".into()));
        }
        if self.ocr.dpi == 0 {
            return Err(ConfigError::Invalid("ocr.dpi must be positive".into()));
        }
        if self.gateway.port == 0 {
            return Err(ConfigError::Invalid("gateway.port must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn defaults_match_documented_behaviour() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 10000);
        assert_eq!(config.ocr.dpi, 300);
        assert_eq!(config.completion.temperature, 0.8);
        assert_eq!(config.completion.top_p, 1.0);
        assert_eq!(config.completion.max_tokens, 2048);
        assert_eq!(
            config.completion.system_prompt,
            "summarize this but don't make it too short"
        );
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "log_level = \"debug\"\n[completion]\nmodel = \"meta/llama3\"\n[gateway]\nport = 8080"
        )
        .unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.completion.model, "meta/llama3");
        assert_eq!(config.completion.max_tokens, 2048);
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.ocr, OcrConfig::default());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway\nport = ").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let err = Config::load(Some("/nonexistent/docsum.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("NVIDIA_API_BASE_URL", "http://localhost:8000/v1"),
                ("API_KEY", "secret"),
                ("TESSERACT_PATH", "/opt/tesseract/bin/tesseract"),
                ("PORT", "9000"),
                ("HOST", ""),
            ]))
            .unwrap();
        assert_eq!(config.completion.base_url, "http://localhost:8000/v1");
        assert_eq!(config.completion.api_key.as_deref(), Some("secret"));
        assert_eq!(config.ocr.tesseract_path, "/opt/tesseract/bin/tesseract");
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "0.0.0.0");
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("PORT", "ten-thousand")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "PORT", .. }));
    }

    #[test]
    fn validate_rejects_out_of_range_sampling() {
        let mut config = Config::default();
        config.completion.top_p = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.completion.temperature = 3.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ocr.dpi = 0;
        assert!(config.validate().is_err());
    }
}
