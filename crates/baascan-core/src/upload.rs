//! Upload preconditions, checked before a file reaches the store or the
//! extractor.

use std::path::Path;

use thiserror::Error;

/// Largest accepted upload: 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const PDF_CONTENT_TYPE: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Please upload a PDF file (got {content_type})")]
    NotPdf { content_type: String },
    #[error("Please upload a PDF file (content does not start with %PDF-)")]
    BadSignature,
    #[error("File size must be less than {}MB ({size} bytes given)", .limit / (1024 * 1024))]
    TooLarge { size: u64, limit: u64 },
}

/// Check content type, PDF signature, and size.
///
/// The content type is compared on its essence, so parameters such as
/// `; charset=binary` are ignored.
pub fn validate_upload(content_type: &str, bytes: &[u8], limit: u64) -> Result<(), UploadError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence != PDF_CONTENT_TYPE {
        return Err(UploadError::NotPdf {
            content_type: content_type.to_string(),
        });
    }

    let size = bytes.len() as u64;
    if size > limit {
        return Err(UploadError::TooLarge { size, limit });
    }

    if !bytes.starts_with(PDF_MAGIC) {
        return Err(UploadError::BadSignature);
    }
    Ok(())
}

/// Content type implied by a local file's extension.
pub fn content_type_for_path(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => PDF_CONTENT_TYPE,
        _ => "application/octet-stream",
    }
}

/// A fresh random object name that keeps the original file extension.
pub fn new_object_name(original: &str) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "pdf".to_string());
    format!("{}.{}", fastrand::u64(..), ext)
}
