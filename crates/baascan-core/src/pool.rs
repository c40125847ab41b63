//! Bounded worker pool for per-match summaries.
//!
//! Jobs go through one shared `async-channel` queue drained by `num_workers`
//! tasks. Each job carries its own oneshot sender, so callers collect results
//! in submission order regardless of completion order.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::llm::TextGenerator;
use crate::summarize::{SUMMARY_FALLBACK, try_summarize};
use crate::{MatchResult, ProgressEvent, ProgressFn};

/// A summary job submitted to the pool.
pub struct SummaryJob {
    pub result: MatchResult,
    pub result_tx: oneshot::Sender<SummaryOutcome>,
    pub index: usize,
    pub total: usize,
    pub progress: ProgressFn,
}

/// The enriched match, plus whether the summary came from the generator
/// (`false` means the fallback text was used).
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub result: MatchResult,
    pub generated: bool,
}

/// A pool of worker tasks that summarize match contexts.
///
/// Submit jobs via [`submit()`](SummaryPool::submit); each job's oneshot
/// receives its outcome. Jobs still queued when the token fires are dropped,
/// which closes their oneshot without a value.
pub struct SummaryPool {
    job_tx: async_channel::Sender<SummaryJob>,
    pool_handle: JoinHandle<()>,
}

impl SummaryPool {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        cancel: CancellationToken,
        num_workers: usize,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<SummaryJob>();

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers.max(1));
            for _ in 0..num_workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    job_rx.clone(),
                    generator.clone(),
                    cancel.clone(),
                )));
            }
            // Workers are now the only receivers.
            drop(job_rx);

            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    pub async fn submit(&self, job: SummaryJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the queue and wait for every worker to finish.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    job_rx: async_channel::Receiver<SummaryJob>,
    generator: Arc<dyn TextGenerator>,
    cancel: CancellationToken,
) {
    while let Ok(job) = job_rx.recv().await {
        if cancel.is_cancelled() {
            // Drain without calling the generator; dropping the job closes
            // its oneshot.
            continue;
        }

        let SummaryJob {
            result,
            result_tx,
            index,
            total,
            progress,
        } = job;

        progress(ProgressEvent::Summarizing {
            index,
            total,
            page: result.page,
            term: result.term.clone(),
        });

        let outcome = tokio::select! {
            _ = cancel.cancelled() => continue,
            outcome = try_summarize(generator.as_ref(), &result.context) => outcome,
        };

        let generated = outcome.is_ok();
        let summary = match outcome {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(
                    page = result.page,
                    term = %result.term,
                    error = %e,
                    "summary failed, using fallback"
                );
                SUMMARY_FALLBACK.to_string()
            }
        };

        progress(ProgressEvent::Summarized {
            index,
            total,
            ok: generated,
        });

        let _ = result_tx.send(SummaryOutcome {
            result: result.with_summary(summary),
            generated,
        });
    }
}
