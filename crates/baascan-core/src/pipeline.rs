//! Entry points that tie extraction, scanning, summaries, and classification
//! to a signed-in session.

use std::sync::Arc;

use crate::aggregate::ResultId;
use crate::backend::PdfBackend;
use crate::classify::{ComplianceReport, classify};
use crate::document::{Document, extract};
use crate::llm::TextGenerator;
use crate::scanner::Scanner;
use crate::session::{AnalysisSession, SessionContext, Superseded};
use crate::store::{BlobStore, fetch_bytes};
use crate::summarize::summarize_matches;
use crate::terms::TermSet;
use crate::upload::{new_object_name, validate_upload};
use crate::{Cancelled, Config, MatchResult, PipelineError, ProgressEvent, ProgressFn};

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Run the summarizer over every match before publishing.
    pub summarize: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { summarize: true }
    }
}

/// What a finished search published.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<MatchResult>,
    pub selected: Option<ResultId>,
}

pub struct Pipeline {
    backend: Arc<dyn PdfBackend>,
    generator: Option<Arc<dyn TextGenerator>>,
    scanner: Scanner,
    num_workers: usize,
    max_upload_bytes: u64,
    client: reqwest::Client,
}

impl Pipeline {
    pub fn new(config: &Config, backend: Arc<dyn PdfBackend>, client: reqwest::Client) -> Self {
        Self {
            backend,
            generator: None,
            scanner: Scanner::new(config.boundary),
            num_workers: config.num_workers.max(1),
            max_upload_bytes: config.max_upload_bytes,
            client,
        }
    }

    /// Attach the generative backend used for summaries and classification.
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    fn generator(&self) -> Result<&Arc<dyn TextGenerator>, PipelineError> {
        self.generator.as_ref().ok_or(PipelineError::NoGenerator)
    }

    fn ensure_active(ctx: &SessionContext) -> Result<(), PipelineError> {
        if ctx.is_active() {
            Ok(())
        } else {
            Err(PipelineError::SignedOut)
        }
    }

    /// Validate an upload and store it under a fresh random name.
    ///
    /// Returns the stored object name.
    pub async fn upload(
        &self,
        ctx: &SessionContext,
        store: &dyn BlobStore,
        original_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<String, PipelineError> {
        Self::ensure_active(ctx)?;
        validate_upload(content_type, bytes, self.max_upload_bytes)?;
        let name = new_object_name(original_name);
        store.upload(ctx.owner_id(), &name, bytes).await?;
        tracing::info!(
            owner = ctx.owner_id(),
            name = %name,
            original = original_name,
            "document uploaded"
        );
        Ok(name)
    }

    /// Extract text from bytes already in hand.
    pub fn load_bytes(
        &self,
        ctx: &SessionContext,
        session: &AnalysisSession,
        bytes: &[u8],
        progress: &ProgressFn,
    ) -> Result<Document, PipelineError> {
        Self::ensure_active(ctx)?;
        session.reset();
        let document = extract(bytes, self.backend.as_ref())?;
        progress(ProgressEvent::Extracted {
            pages: document.page_count(),
        });
        Ok(document)
    }

    /// Fetch a stored document through its public URL and extract its text.
    ///
    /// Loading a document discards the session's previous results and
    /// cancels any search still running.
    pub async fn load(
        &self,
        ctx: &SessionContext,
        session: &AnalysisSession,
        store: &dyn BlobStore,
        name: &str,
        progress: &ProgressFn,
    ) -> Result<Document, PipelineError> {
        Self::ensure_active(ctx)?;
        let url = store.public_url(ctx.owner_id(), name)?;
        let bytes = fetch_bytes(&url, &self.client).await?;
        tracing::debug!(url = %url, bytes = bytes.len(), "fetched document");
        self.load_bytes(ctx, session, &bytes, progress)
    }

    /// Scan, optionally summarize, and publish to the session.
    ///
    /// Starting a search cancels any search still running in `session`. If
    /// this search is itself superseded before it finishes, its results are
    /// dropped and `PipelineError::Superseded` is returned.
    pub async fn search(
        &self,
        ctx: &SessionContext,
        session: &AnalysisSession,
        document: &Document,
        terms: &TermSet,
        options: SearchOptions,
        progress: ProgressFn,
    ) -> Result<SearchOutcome, PipelineError> {
        Self::ensure_active(ctx)?;
        let generator = if options.summarize {
            Some(self.generator()?.clone())
        } else {
            None
        };

        let ticket = session.begin_search(ctx);
        let matches = self.scanner.scan(document, terms)?;
        progress(ProgressEvent::Scanned {
            matches: matches.len(),
            terms: terms.len(),
        });

        let results = match generator {
            Some(generator) => summarize_matches(
                matches,
                generator,
                self.num_workers,
                progress.clone(),
                ticket.cancel_token().clone(),
            )
            .await
            .map_err(|Cancelled| {
                if session.current_generation() == ticket.generation() {
                    PipelineError::Cancelled(Cancelled)
                } else {
                    PipelineError::Superseded(Superseded)
                }
            })?,
            None => matches,
        };

        let selected = session.publish(&ticket, results.clone())?;
        tracing::info!(
            owner = ctx.owner_id(),
            results = results.len(),
            generation = ticket.generation(),
            "search published"
        );
        Ok(SearchOutcome { results, selected })
    }

    /// Classify the whole document against the compliance categories.
    pub async fn classify(
        &self,
        ctx: &SessionContext,
        document: &Document,
        progress: &ProgressFn,
    ) -> Result<ComplianceReport, PipelineError> {
        Self::ensure_active(ctx)?;
        let generator = self.generator()?;
        let text = document.full_text();
        progress(ProgressEvent::Classifying { chars: text.len() });

        let report = tokio::select! {
            _ = ctx.cancel_token().cancelled() => return Err(Cancelled.into()),
            report = classify(generator.as_ref(), &text) => report?,
        };

        progress(ProgressEvent::Classified {
            categories_found: report.category_references.found_count(),
            missing: report.missing_requirements.len(),
        });
        Ok(report)
    }
}
