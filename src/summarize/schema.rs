use serde::{Deserialize, Serialize};

/// Instruction used when the caller does not send a `prompt` field.
pub const DEFAULT_PROMPT: &str = "Summarize the content.";

/// A file received from the upload form. Consumed once by the pipeline.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub data: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        DocumentKind::from_filename(&self.filename)
    }
}

/// How an upload is read: PDFs page by page, everything else as UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    /// Only a lowercase `.pdf` suffix selects the PDF path.
    pub fn from_filename(filename: &str) -> Self {
        if filename.ends_with(".pdf") {
            Self::Pdf
        } else {
            Self::PlainText
        }
    }
}

/// Where a page's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    Native,
    Ocr,
}

/// Text pulled out of an upload, plus per-page provenance for PDFs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    text: String,
    pages: Vec<PageSource>,
}

impl ExtractedText {
    /// Whole-document text with no page structure (plain-text uploads).
    pub fn plain(text: String) -> Self {
        Self {
            text,
            pages: Vec::new(),
        }
    }

    /// Append one page, newline-terminated.
    pub fn push_page(&mut self, text: &str, source: PageSource) {
        self.text.push_str(text);
        self.text.push('\n');
        self.pages.push(source);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn pages(&self) -> &[PageSource] {
        &self.pages
    }

    pub fn ocr_page_count(&self) -> usize {
        self.pages.iter().filter(|p| **p == PageSource::Ocr).count()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One entry of an OpenAI-style `messages` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body of a `POST /chat/completions` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Accumulated model output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary(String);

impl Summary {
    pub fn push_fragment(&mut self, fragment: &str) {
        self.0.push_str(fragment);
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// `200` body of `POST /summarize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

/// Error body. `details` is only present on server errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
