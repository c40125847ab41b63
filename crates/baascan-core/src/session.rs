//! Session identity and per-session search state.

use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::MatchResult;
use crate::aggregate::{EmptyResultsError, ResultId, ResultSet};

/// A signed-in owner. Every pipeline entry point takes one.
///
/// Clones share one lifetime: signing out through any clone deactivates all
/// of them and cancels the work started under them.
#[derive(Debug, Clone)]
pub struct SessionContext {
    owner_id: String,
    cancel: CancellationToken,
}

impl SessionContext {
    pub fn sign_in(owner_id: impl Into<String>) -> Self {
        let owner_id = owner_id.into();
        tracing::debug!(owner = %owner_id, "session started");
        Self {
            owner_id,
            cancel: CancellationToken::new(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Token that fires on sign-out. Work started under this session should
    /// use a child of it.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn sign_out(self) {
        tracing::debug!(owner = %self.owner_id, "session ended");
        self.cancel.cancel();
    }
}

/// A newer search (or a new document) replaced the one that produced these
/// results.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("search was superseded by a newer one")]
pub struct Superseded;

/// Proof of which search is allowed to publish.
#[derive(Debug)]
pub struct SearchTicket {
    generation: u64,
    cancel: CancellationToken,
}

impl SearchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Fires when a newer search starts, the session is reset, or the owner
    /// signs out.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[derive(Default)]
struct SearchState {
    results: ResultSet,
    generation: u64,
    in_flight: Option<CancellationToken>,
}

impl SearchState {
    fn supersede(&mut self) {
        self.generation += 1;
        if let Some(previous) = self.in_flight.take() {
            previous.cancel();
        }
    }
}

/// Result set plus in-flight search bookkeeping, updated as one unit.
///
/// Only the most recent search may publish. Starting a search cancels the
/// previous one, so its summaries stop and its late results are refused.
#[derive(Default)]
pub struct AnalysisSession {
    state: Mutex<SearchState>,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SearchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a search, cancelling whichever one is still running.
    pub fn begin_search(&self, ctx: &SessionContext) -> SearchTicket {
        let mut state = self.lock();
        state.supersede();
        let cancel = ctx.cancel_token().child_token();
        state.in_flight = Some(cancel.clone());
        tracing::debug!(generation = state.generation, "search started");
        SearchTicket {
            generation: state.generation,
            cancel,
        }
    }

    /// Generation of the most recently started search.
    pub fn current_generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn is_current(&self, ticket: &SearchTicket) -> bool {
        self.lock().generation == ticket.generation && !ticket.cancel.is_cancelled()
    }

    /// Replace the result set and select its first element, if `ticket` is
    /// still the current search.
    pub fn publish(
        &self,
        ticket: &SearchTicket,
        results: Vec<MatchResult>,
    ) -> Result<Option<ResultId>, Superseded> {
        let mut state = self.lock();
        if state.generation != ticket.generation || ticket.cancel.is_cancelled() {
            tracing::debug!(
                ticket = ticket.generation,
                current = state.generation,
                "dropping superseded results"
            );
            return Err(Superseded);
        }
        state.in_flight = None;
        Ok(state.results.replace_and_select_first(results))
    }

    /// Forget the current results (a new document was loaded). Any search
    /// still running is cancelled and can no longer publish.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.supersede();
        state.results.clear();
    }

    pub fn with_results<R>(&self, f: impl FnOnce(&ResultSet) -> R) -> R {
        f(&self.lock().results)
    }

    pub fn results(&self) -> Vec<MatchResult> {
        self.lock().results.results().to_vec()
    }

    pub fn select(&self, id: ResultId) -> bool {
        self.lock().results.select(id)
    }

    pub fn selected(&self) -> Option<MatchResult> {
        self.lock().results.selected().cloned()
    }

    pub fn export_text(&self) -> Result<String, EmptyResultsError> {
        self.lock().results.export_text()
    }
}
