use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aggregate;
pub mod backend;
pub mod classify;
pub mod config_file;
pub mod document;
pub mod highlight;
pub mod llm;
pub mod pipeline;
pub mod pool;
pub mod rate_limit;
pub mod scanner;
pub mod session;
pub mod store;
pub mod summarize;
pub mod terms;
pub mod upload;

// Re-export for convenience
pub use aggregate::{EmptyResultsError, ResultId, ResultSet, export_text};
pub use backend::{BackendError, PdfBackend};
pub use classify::{
    Category, CategoryReference, CategoryReferences, ClassificationError, ComplianceReport,
    MissingRequirement, classify,
};
pub use document::{Document, ExtractionError, extract};
pub use llm::{GenerationError, GeneratorConfig, Provider, StructuredRequest, TextGenerator};
pub use pipeline::{Pipeline, SearchOptions, SearchOutcome};
pub use scanner::{BoundaryPolicy, ScanError, Scanner, scan};
pub use session::{AnalysisSession, SearchTicket, SessionContext, Superseded};
pub use store::{BlobStore, FetchError, LocalBlobStore, StorageError, StoredFile, fetch_bytes};
pub use summarize::{SUMMARY_FALLBACK, summarize, summarize_matches};
pub use terms::{DEFAULT_TERMS, TERM_DELIMITER, TermSet};
pub use upload::{MAX_UPLOAD_BYTES, UploadError, validate_upload};

/// One occurrence of a search term on a page, with its clause-scoped context.
///
/// `summary` is empty until the summarizer has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// 1-based page number.
    pub page: usize,
    pub term: String,
    pub context: String,
    pub summary: String,
}

impl MatchResult {
    pub fn new(page: usize, term: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            page,
            term: term.into(),
            context: context.into(),
            summary: String::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }
}

/// Returned when an in-flight operation observed its cancellation token.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// Top-level error for pipeline entry points.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no active session")]
    SignedOut,
    #[error("no generative backend configured")]
    NoGenerator,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("Failed to analyze document: {0}")]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Superseded(#[from] Superseded),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Progress events emitted while a document is being analyzed.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Extracted {
        pages: usize,
    },
    Scanned {
        matches: usize,
        terms: usize,
    },
    Summarizing {
        index: usize,
        total: usize,
        page: usize,
        term: String,
    },
    Summarized {
        index: usize,
        total: usize,
        ok: bool,
    },
    SummariesComplete {
        total: usize,
        failed: usize,
    },
    Classifying {
        chars: usize,
    },
    Classified {
        categories_found: usize,
        missing: usize,
    },
}

/// Shared progress callback handed to the pipeline and the summary pool.
pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// A progress callback that discards every event.
pub fn no_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// Runtime configuration for the analysis pipeline.
#[derive(Clone, Debug)]
pub struct Config {
    pub generator: GeneratorConfig,
    pub num_workers: usize,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
    pub default_terms: TermSet,
    pub term_delimiter: char,
    pub boundary: BoundaryPolicy,
    pub storage_root: PathBuf,
    pub max_upload_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            num_workers: 4,
            timeout_secs: 60,
            requests_per_minute: 60,
            default_terms: TermSet::default_terms(),
            term_delimiter: TERM_DELIMITER,
            boundary: BoundaryPolicy::default(),
            storage_root: default_storage_root(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parse user search input with the configured term delimiter.
    ///
    /// Empty input falls back to the configured default terms.
    pub fn parse_terms(&self, input: &str) -> TermSet {
        let terms = TermSet::parse_with(input, self.term_delimiter);
        if terms.is_empty() {
            self.default_terms.clone()
        } else {
            terms
        }
    }
}

/// Platform data directory path: `<data_dir>/baascan/store`.
pub fn default_storage_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("baascan")
        .join("store")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let mut config = Config::default();
        config.generator.api_key = Some("sk-secret-value".into());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-secret-value"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn blank_input_uses_default_terms() {
        let config = Config::default();
        assert_eq!(config.parse_terms("  |  "), TermSet::default_terms());
        assert_eq!(config.parse_terms("Audit").len(), 1);
    }

    #[test]
    fn match_result_starts_unsummarized() {
        let m = MatchResult::new(2, "breach", "report breaches,");
        assert!(m.summary.is_empty());
        assert_eq!(m.with_summary("ok").summary, "ok");
    }
}
