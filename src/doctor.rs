//! `docsum check`: report whether the OCR toolchain resolves on this host.

use crate::config::OcrConfig;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub name: &'static str,
    pub configured: String,
    pub resolved: Option<PathBuf>,
}

impl ToolStatus {
    pub fn is_ok(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Resolve each configured binary through `PATH` (or as a literal path).
pub fn check_ocr_tools(config: &OcrConfig) -> Vec<ToolStatus> {
    [
        ("tesseract", &config.tesseract_path),
        ("pdftoppm", &config.pdftoppm_path),
    ]
    .into_iter()
    .map(|(name, configured)| ToolStatus {
        name,
        configured: configured.clone(),
        resolved: which::which(configured).ok(),
    })
    .collect()
}
