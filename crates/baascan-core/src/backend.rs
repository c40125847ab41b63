use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("PDF is encrypted")]
    Encrypted,
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
}

/// Trait for PDF text extraction backends.
///
/// Implementors decode a PDF byte stream and return one string per page, in
/// page order, with the page's visible text runs joined by single spaces.
/// Validation of the result (empty documents, page numbering) lives in
/// [`crate::document::extract`].
pub trait PdfBackend: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, BackendError>;
}
