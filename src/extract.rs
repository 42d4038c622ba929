//! Direct PDF text extraction.
//!
//! Used when the structured parser gives nothing usable for a file: failure
//! References carry this text as best-effort contents, and complete References
//! parsed in header-only mode use it as their body.

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot read {0}: {1}")]
    Read(String, std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

pub fn extract_pdf_bytes(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Extracts the plain text of the PDF at `path`.
pub fn extract_pdf_text(path: &Path) -> Result<String, ExtractError> {
    let bytes =
        std::fs::read(path).map_err(|e| ExtractError::Read(path.display().to_string(), e))?;
    extract_pdf_bytes(&bytes)
}

/// Like [`extract_pdf_text`], but logs and returns `None` on failure or when
/// the document has no text.
pub fn best_effort_text(path: &Path) -> Option<String> {
    match extract_pdf_text(path) {
        Ok(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "text extraction failed");
            None
        }
    }
}

/// Source of fallback text for a staged PDF.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Option<String>;
}

/// [`TextExtractor`] backed by `pdf-extract`.
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, path: &Path) -> Option<String> {
        best_effort_text(path)
    }
}
