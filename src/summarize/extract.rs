use super::error::SummarizeError;
use super::ocr::OcrEngine;
use super::pdf::PdfEngine;
use super::schema::{DocumentKind, ExtractedText, PageSource, UploadedDocument};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Pulls text out of an upload. Blocking: PDF parsing, rendering and OCR
/// all run on the calling thread.
#[derive(Clone)]
pub struct Extractor {
    pdf: Arc<dyn PdfEngine>,
    ocr: Arc<dyn OcrEngine>,
    dpi: u32,
}

impl Extractor {
    pub fn new(pdf: Arc<dyn PdfEngine>, ocr: Arc<dyn OcrEngine>, dpi: u32) -> Self {
        Self { pdf, ocr, dpi }
    }

    /// Dispatch on the filename extension and reject blank results.
    pub fn extract(&self, document: UploadedDocument) -> Result<ExtractedText, SummarizeError> {
        let kind = document.kind();
        let text = match kind {
            DocumentKind::Pdf => {
                debug!("Processing PDF file");
                self.extract_pdf(&document.data)
                    .map_err(SummarizeError::Extraction)?
            }
            DocumentKind::PlainText => {
                debug!("Processing plain text file");
                decode_plain_text(document.data)?
            }
        };

        if text.is_blank() {
            return Err(SummarizeError::NoExtractableText(kind));
        }
        Ok(text)
    }

    /// Native text per page, OCR for pages that have none.
    pub fn extract_pdf(&self, data: &[u8]) -> Result<ExtractedText> {
        let doc = self.pdf.open(data)?;
        let mut text = ExtractedText::default();

        for page in doc.page_numbers() {
            let native = doc.page_text(page)?;
            if !native.trim().is_empty() {
                text.push_page(&native, PageSource::Native);
                continue;
            }

            debug!(page, "No text found, using OCR on the page");
            let image = doc
                .render_page(page, self.dpi)
                .with_context(|| format!("Failed to render page {page}"))?;
            let recognized = self
                .ocr
                .recognize(&image)
                .with_context(|| format!("OCR failed on page {page}"))?;
            text.push_page(&recognized, PageSource::Ocr);
        }

        debug!(
            pages = text.pages().len(),
            ocr_pages = text.ocr_page_count(),
            "Text extracted from PDF successfully"
        );
        Ok(text)
    }
}

/// Strict UTF-8 decode; the bytes are kept exactly as uploaded.
pub fn decode_plain_text(data: Vec<u8>) -> Result<ExtractedText, SummarizeError> {
    let text = String::from_utf8(data).map_err(SummarizeError::Decode)?;
    debug!(bytes = text.len(), "Text extracted from plain text file successfully");
    Ok(ExtractedText::plain(text))
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::super::pdf::PdfDocument;
    use super::*;
    use anyhow::anyhow;
    use parking_lot::Mutex;

    /// In-memory PDF: one entry per page, `""` for a scanned page.
    pub struct FakePdf {
        pub pages: Vec<&'static str>,
        pub fail_open: bool,
    }

    impl FakePdf {
        pub fn with_pages(pages: Vec<&'static str>) -> Self {
            Self {
                pages,
                fail_open: false,
            }
        }
    }

    impl PdfEngine for FakePdf {
        fn open(&self, _data: &[u8]) -> Result<Box<dyn PdfDocument>> {
            if self.fail_open {
                return Err(anyhow!("trailer not found"));
            }
            Ok(Box::new(FakeDoc(self.pages.clone())))
        }
    }

    struct FakeDoc(Vec<&'static str>);

    impl PdfDocument for FakeDoc {
        fn page_numbers(&self) -> Vec<u32> {
            (1..=self.0.len() as u32).collect()
        }

        fn page_text(&self, page: u32) -> Result<String> {
            Ok(self.0[page as usize - 1].to_string())
        }

        fn render_page(&self, page: u32, dpi: u32) -> Result<Vec<u8>> {
            Ok(format!("page-{page}@{dpi}").into_bytes())
        }
    }

    /// Echoes the "image" back as recognized text and records every call.
    #[derive(Default)]
    pub struct FakeOcr {
        pub calls: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl OcrEngine for FakeOcr {
        fn recognize(&self, image: &[u8]) -> Result<String> {
            let image = String::from_utf8_lossy(image).into_owned();
            self.calls.lock().push(image.clone());
            if self.fail {
                return Err(anyhow!("tesseract exited with 1"));
            }
            Ok(format!("ocr:{image}"))
        }
    }
}
