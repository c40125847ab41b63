//! Extracted document text, one string per page.

use thiserror::Error;

use crate::backend::{BackendError, PdfBackend};

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to extract text from PDF: not a well-formed PDF document ({0})")]
    Malformed(String),
    #[error("Failed to extract text from PDF: the document is encrypted")]
    Encrypted,
    #[error("Failed to extract text from PDF: {0}")]
    Unreadable(String),
    #[error("No text could be extracted from the PDF")]
    NoText,
}

impl From<BackendError> for ExtractionError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::OpenError(msg) => ExtractionError::Malformed(msg),
            BackendError::Encrypted => ExtractionError::Encrypted,
            BackendError::ExtractionError(msg) => ExtractionError::Unreadable(msg),
        }
    }
}

/// Per-page plain text of a PDF. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    byte_len: usize,
    pages: Vec<String>,
}

impl Document {
    /// Build a document from already-extracted page texts.
    pub fn from_pages(pages: Vec<String>) -> Self {
        Self { byte_len: 0, pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Size of the source PDF in bytes (0 when built from text).
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Text of a page by its 1-based number.
    pub fn page(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .map(String::as_str)
    }

    /// Iterate `(page_number, text)` pairs with 1-based numbering.
    pub fn pages(&self) -> impl Iterator<Item = (usize, &str)> {
        self.pages
            .iter()
            .enumerate()
            .map(|(i, text)| (i + 1, text.as_str()))
    }

    /// All page texts joined by single spaces.
    pub fn full_text(&self) -> String {
        self.pages.join(" ")
    }

    pub fn has_text(&self) -> bool {
        self.pages.iter().any(|p| !p.trim().is_empty())
    }
}

/// Decode `bytes` with `backend` into a [`Document`].
///
/// Fails when the backend cannot read the PDF or when no page yields any
/// non-whitespace text. No partial document is ever returned.
pub fn extract(bytes: &[u8], backend: &dyn PdfBackend) -> Result<Document, ExtractionError> {
    let pages = backend.extract_pages(bytes)?;
    let document = Document {
        byte_len: bytes.len(),
        pages,
    };
    if !document.has_text() {
        return Err(ExtractionError::NoText);
    }
    tracing::debug!(
        pages = document.page_count(),
        bytes = document.byte_len,
        "extracted document text"
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    enum FixedBackend {
        Pages(Vec<&'static str>),
        Encrypted,
        Broken(&'static str),
    }

    impl PdfBackend for FixedBackend {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<String>, BackendError> {
            match self {
                FixedBackend::Pages(pages) => Ok(pages.iter().map(|p| p.to_string()).collect()),
                FixedBackend::Encrypted => Err(BackendError::Encrypted),
                FixedBackend::Broken(msg) => Err(BackendError::OpenError(msg.to_string())),
            }
        }
    }

    #[test]
    fn pages_are_one_based() {
        let doc = Document::from_pages(vec!["first".into(), "second".into()]);
        assert_eq!(doc.page(0), None);
        assert_eq!(doc.page(1), Some("first"));
        assert_eq!(doc.page(2), Some("second"));
        assert_eq!(doc.page(3), None);
        let numbers: Vec<usize> = doc.pages().map(|(n, _)| n).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn full_text_is_space_joined() {
        let doc = Document::from_pages(vec!["a b".into(), "c".into()]);
        assert_eq!(doc.full_text(), "a b c");
    }

    #[test]
    fn extraction_keeps_every_page() {
        let backend = FixedBackend::Pages(vec!["one", "", "three"]);
        let doc = extract(b"%PDF-1.7", &backend).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.byte_len(), 8);
        assert_eq!(doc.page(2), Some(""));
    }

    #[test]
    fn whitespace_only_document_is_rejected() {
        let backend = FixedBackend::Pages(vec!["  ", "\n"]);
        let err = extract(b"%PDF-1.7", &backend).unwrap_err();
        assert!(matches!(err, ExtractionError::NoText));
    }

    #[test]
    fn backend_errors_map_to_extraction_errors() {
        let backend = FixedBackend::Encrypted;
        assert!(matches!(
            extract(b"", &backend),
            Err(ExtractionError::Encrypted)
        ));

        let backend = FixedBackend::Broken("bad header");
        assert!(matches!(
            extract(b"", &backend),
            Err(ExtractionError::Malformed(_))
        ));
    }
}
