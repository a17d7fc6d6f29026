use super::completion::{accumulate, CompletionClient, OpenAiCompatibleClient};
use super::error::SummarizeError;
use super::extract::Extractor;
use super::ocr::TesseractOcr;
use super::pdf::PopplerPdfEngine;
use super::schema::{
    ChatMessage, CompletionRequest, DocumentKind, ExtractedText, Summary, UploadedDocument,
    DEFAULT_PROMPT,
};
use crate::config::{CompletionConfig, Config};
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Extract, then summarize. Holds no per-request state, so one instance is
/// shared by every request.
pub struct Pipeline {
    extractor: Extractor,
    completion: Arc<dyn CompletionClient>,
    config: CompletionConfig,
}

impl Pipeline {
    pub fn new(
        extractor: Extractor,
        completion: Arc<dyn CompletionClient>,
        config: CompletionConfig,
    ) -> Self {
        Self {
            extractor,
            completion,
            config,
        }
    }

    /// Production wiring: lopdf + pdftoppm, tesseract, OpenAI-compatible HTTP.
    pub fn from_config(config: &Config) -> Result<Self> {
        let extractor = Extractor::new(
            Arc::new(PopplerPdfEngine::new(&config.ocr.pdftoppm_path)),
            Arc::new(TesseractOcr::new(&config.ocr.tesseract_path, &config.ocr.lang)),
            config.ocr.dpi,
        );
        let client = OpenAiCompatibleClient::new(
            &config.completion.base_url,
            config.completion.api_key.clone(),
            config.completion.connect_timeout(),
        )?;
        Ok(Self::new(
            extractor,
            Arc::new(client),
            config.completion.clone(),
        ))
    }

    pub async fn summarize(
        &self,
        document: UploadedDocument,
        prompt: Option<String>,
    ) -> Result<Summary, SummarizeError> {
        let text = self.extract(document).await?;

        // Accepted and logged; the system message stays fixed.
        let prompt = prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string());
        debug!(%prompt, "Custom prompt");

        let request = self.build_request(&text);
        let limit = self.config.timeout();
        let summary = tokio::time::timeout(limit, self.complete(&request))
            .await
            .map_err(|_| SummarizeError::Timeout(limit))??;

        if summary.is_blank() {
            return Err(SummarizeError::EmptySummary);
        }
        debug!(chars = summary.as_str().len(), "Summary generated");
        Ok(summary)
    }

    async fn extract(&self, document: UploadedDocument) -> Result<ExtractedText, SummarizeError> {
        match document.kind() {
            DocumentKind::PlainText => self.extractor.extract(document),
            DocumentKind::Pdf => {
                let extractor = self.extractor.clone();
                tokio::task::spawn_blocking(move || extractor.extract(document))
                    .await
                    .map_err(|e| {
                        SummarizeError::Extraction(
                            anyhow::Error::new(e).context("PDF extraction worker failed"),
                        )
                    })?
            }
        }
    }

    pub fn build_request(&self, text: &ExtractedText) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(&self.config.system_prompt),
                ChatMessage::user(text.as_str()),
            ],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
            stream: true,
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Summary, SummarizeError> {
        debug!(model = %request.model, "Calling completion API");
        let fragments = self
            .completion
            .stream(request)
            .await
            .map_err(SummarizeError::Completion)?;
        debug!("Model response received");
        accumulate(fragments)
            .await
            .map_err(SummarizeError::StreamAccumulation)
    }
}
