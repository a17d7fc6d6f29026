use anyhow::{bail, Context, Result};
use lopdf::Document;
use std::path::PathBuf;
use std::process::Command;

/// Opens PDF bytes into a page-addressable document.
pub trait PdfEngine: Send + Sync {
    fn open(&self, data: &[u8]) -> Result<Box<dyn PdfDocument>>;
}

/// A parsed PDF. Page numbers are 1-based.
pub trait PdfDocument {
    /// All page numbers in document order.
    fn page_numbers(&self) -> Vec<u32>;

    /// Text embedded in the page, possibly empty for scanned pages.
    fn page_text(&self, page: u32) -> Result<String>;

    /// Render a single page to PNG bytes.
    fn render_page(&self, page: u32, dpi: u32) -> Result<Vec<u8>>;
}

/// lopdf for structure and text, poppler's `pdftoppm` for rendering.
pub struct PopplerPdfEngine {
    pdftoppm: PathBuf,
}

impl PopplerPdfEngine {
    pub fn new(pdftoppm: impl Into<PathBuf>) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
        }
    }
}

impl PdfEngine for PopplerPdfEngine {
    fn open(&self, data: &[u8]) -> Result<Box<dyn PdfDocument>> {
        let doc = Document::load_mem(data).context("Failed to parse PDF")?;
        if doc.is_encrypted() {
            bail!("PDF is password-protected");
        }
        Ok(Box::new(LopdfDocument {
            doc,
            raw: data.to_vec(),
            pdftoppm: self.pdftoppm.clone(),
        }))
    }
}

struct LopdfDocument {
    doc: Document,
    raw: Vec<u8>,
    pdftoppm: PathBuf,
}

impl PdfDocument for LopdfDocument {
    fn page_numbers(&self) -> Vec<u32> {
        // BTreeMap keys, already ascending
        self.doc.get_pages().into_keys().collect()
    }

    fn page_text(&self, page: u32) -> Result<String> {
        self.doc
            .extract_text(&[page])
            .with_context(|| format!("Failed to extract text from page {page}"))
    }

    fn render_page(&self, page: u32, dpi: u32) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
        let input = scratch.path().join("input.pdf");
        std::fs::write(&input, &self.raw).context("Failed to write PDF to scratch directory")?;
        let prefix = scratch.path().join("page");

        let output = Command::new(&self.pdftoppm)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-singlefile")
            .arg(&input)
            .arg(&prefix)
            .output()
            .with_context(|| format!("Failed to run {}", self.pdftoppm.display()))?;

        if !output.status.success() {
            bail!(
                "pdftoppm failed on page {page}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        // -singlefile writes <prefix>.png with no page suffix
        std::fs::read(prefix.with_extension("png"))
            .with_context(|| format!("pdftoppm produced no image for page {page}"))
    }
}
