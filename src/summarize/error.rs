use super::schema::{DocumentKind, ErrorResponse};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;

/// Every way a summarize request can fail.
#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("No file selected")]
    EmptyFilename,

    #[error("Uploaded file is too large")]
    UploadTooLarge { limit: usize },

    #[error("Error extracting text from PDF")]
    Extraction(#[source] anyhow::Error),

    #[error("{}", no_text_message(.0))]
    NoExtractableText(DocumentKind),

    #[error("Error reading plain text file")]
    Decode(#[source] std::string::FromUtf8Error),

    #[error("An error occurred while calling the completion API")]
    Completion(#[source] anyhow::Error),

    #[error("Error while extracting summary")]
    StreamAccumulation(#[source] anyhow::Error),

    #[error("No summary was generated by the model.")]
    EmptySummary,

    #[error("The completion API did not respond in time")]
    Timeout(Duration),

    #[error("An error occurred during summarization")]
    Unhandled(#[source] anyhow::Error),
}

fn no_text_message(kind: &DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Pdf => "No text could be extracted from the PDF.",
        DocumentKind::PlainText => "No text found in the uploaded file.",
    }
}

impl SummarizeError {
    /// Stable name of the failure, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingFile => "MissingFile",
            Self::EmptyFilename => "EmptyFilename",
            Self::UploadTooLarge { .. } => "UploadTooLarge",
            Self::Extraction(_) => "ExtractionError",
            Self::NoExtractableText(_) => "NoExtractableText",
            Self::Decode(_) => "DecodeError",
            Self::Completion(_) => "CompletionError",
            Self::StreamAccumulation(_) => "StreamAccumulationError",
            Self::EmptySummary => "EmptySummary",
            Self::Timeout(_) => "Timeout",
            Self::Unhandled(_) => "Unhandled",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingFile | Self::EmptyFilename | Self::NoExtractableText(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Extraction(_)
            | Self::Decode(_)
            | Self::Completion(_)
            | Self::StreamAccumulation(_)
            | Self::EmptySummary
            | Self::Timeout(_)
            | Self::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Cause text returned to the client. Client errors carry none.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::MissingFile | Self::EmptyFilename | Self::NoExtractableText(_) => None,
            Self::UploadTooLarge { limit } => {
                Some(format!("uploads are limited to {limit} bytes"))
            }
            Self::Extraction(e)
            | Self::Completion(e)
            | Self::StreamAccumulation(e)
            | Self::Unhandled(e) => Some(format!("{e:#}")),
            Self::Decode(e) => Some(e.to_string()),
            Self::EmptySummary => Some("the completion stream produced no content".to_string()),
            Self::Timeout(limit) => Some(format!(
                "no complete response within {}s",
                limit.as_secs_f64()
            )),
        }
    }

    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            details: self.details(),
        }
    }
}

impl IntoResponse for SummarizeError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_body())).into_response()
    }
}
