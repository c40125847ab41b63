//! Best-effort per-match summaries.
//!
//! A failed summary never aborts a search: the match keeps its context and
//! gets [`SUMMARY_FALLBACK`] as its summary.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::llm::{GenerationError, TextGenerator};
use crate::pool::{SummaryJob, SummaryPool};
use crate::{Cancelled, MatchResult, ProgressEvent, ProgressFn};

/// Summary text recorded when the generator call fails.
pub const SUMMARY_FALLBACK: &str = "Failed to generate summary.";

fn summary_prompt(context: &str) -> String {
    format!(
        "Summarize this contract excerpt in one or two sentences: {}",
        context
    )
}

/// Ask the generator for a summary of `context`.
///
/// A blank answer counts as a failure.
pub async fn try_summarize(
    generator: &dyn TextGenerator,
    context: &str,
) -> Result<String, GenerationError> {
    let prompt = summary_prompt(context);
    let text = generator.generate(&prompt).await?;
    if text.trim().is_empty() {
        return Err(GenerationError::Parse("empty summary".into()));
    }
    Ok(text)
}

/// Summarize `context`, returning [`SUMMARY_FALLBACK`] on any failure.
pub async fn summarize(generator: &dyn TextGenerator, context: &str) -> String {
    match try_summarize(generator, context).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::warn!(error = %e, "summary failed, using fallback");
            SUMMARY_FALLBACK.to_string()
        }
    }
}

/// Summarize every match on a [`SummaryPool`] of `num_workers` tasks.
///
/// The returned matches keep their input order. If `cancel` fires before
/// every summary has arrived, the partial batch is discarded and
/// `Err(Cancelled)` is returned.
pub async fn summarize_matches(
    matches: Vec<MatchResult>,
    generator: Arc<dyn TextGenerator>,
    num_workers: usize,
    progress: ProgressFn,
    cancel: CancellationToken,
) -> Result<Vec<MatchResult>, Cancelled> {
    let total = matches.len();
    if total == 0 {
        return Ok(matches);
    }

    let pool = SummaryPool::new(generator, cancel.clone(), num_workers.min(total));

    let mut receivers = Vec::with_capacity(total);
    for (index, result) in matches.into_iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let (result_tx, result_rx) = tokio::sync::oneshot::channel();
        pool.submit(SummaryJob {
            result,
            result_tx,
            index,
            total,
            progress: progress.clone(),
        })
        .await;
        receivers.push(result_rx);
    }

    let mut enriched = Vec::with_capacity(total);
    let mut failed = 0;
    for rx in receivers {
        match rx.await {
            Ok(outcome) => {
                if !outcome.generated {
                    failed += 1;
                }
                enriched.push(outcome.result);
            }
            // Sender dropped: the worker saw the cancellation.
            Err(_) => break,
        }
    }

    pool.shutdown().await;

    if cancel.is_cancelled() || enriched.len() < total {
        tracing::debug!(done = enriched.len(), total, "summaries cancelled");
        return Err(Cancelled);
    }

    progress(ProgressEvent::SummariesComplete { total, failed });
    Ok(enriched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{MockGenerator, MockReply};
    use crate::no_progress;
    use std::sync::Mutex;
    use std::time::Duration;

    fn matches(n: usize) -> Vec<MatchResult> {
        (0..n)
            .map(|i| MatchResult::new(i + 1, "breach", format!("clause {i},")))
            .collect()
    }

    #[tokio::test]
    async fn failure_yields_fallback() {
        let mock = MockGenerator::new(
            "mock",
            MockReply::Error(GenerationError::Connection("refused".into())),
        );
        assert_eq!(summarize(&mock, "breach within 24 hours,").await, SUMMARY_FALLBACK);
        assert_eq!(
            summarize(&mock, "anything").await,
            "Failed to generate summary."
        );
    }

    #[tokio::test]
    async fn success_is_returned_verbatim() {
        let mock = MockGenerator::new("mock", MockReply::Text("  Reports within a day. ".into()));
        assert_eq!(
            summarize(&mock, "report breaches within 24 hours,").await,
            "  Reports within a day. "
        );
        assert!(mock.prompts()[0].contains("report breaches within 24 hours,"));
    }

    #[tokio::test]
    async fn blank_answer_is_a_failure() {
        let mock = MockGenerator::new("mock", MockReply::Text("   ".into()));
        assert_eq!(summarize(&mock, "x").await, SUMMARY_FALLBACK);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let generator = Arc::new(MockGenerator::from_fn("mock", |prompt| {
            if prompt.contains("clause 1,") {
                MockReply::Error(GenerationError::Timeout(Duration::from_secs(1)))
            } else {
                MockReply::Text("ok".into())
            }
        }));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let progress: ProgressFn = Arc::new(move |e: ProgressEvent| sink.lock().unwrap().push(e));

        let out = summarize_matches(matches(3), generator, 2, progress, CancellationToken::new())
            .await
            .unwrap();

        let summaries: Vec<&str> = out.iter().map(|m| m.summary.as_str()).collect();
        assert_eq!(summaries, vec!["ok", SUMMARY_FALLBACK, "ok"]);
        let pages: Vec<usize> = out.iter().map(|m| m.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);

        let events = events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::SummariesComplete { total: 3, failed: 1 })
        ));
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let generator = Arc::new(MockGenerator::new("mock", MockReply::Text("x".into())));
        let out = summarize_matches(
            Vec::new(),
            generator.clone(),
            4,
            no_progress(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(out.is_empty());
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_returns_cancelled() {
        let generator = Arc::new(MockGenerator::new("mock", MockReply::Text("x".into())));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result =
            summarize_matches(matches(2), generator.clone(), 2, no_progress(), cancel).await;
        assert_eq!(result, Err(Cancelled));
        assert_eq!(generator.call_count(), 0);
    }
}
