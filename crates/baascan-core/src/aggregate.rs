//! The ordered, selectable result set.
//!
//! Selection is a [`ResultId`] handle rather than a reference into the set.
//! Every replacement bumps the set's generation, so a handle taken before a
//! new search can never select into the new results.

use thiserror::Error;

use crate::MatchResult;

/// Export was requested on an empty result set.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("No search results to copy!")]
pub struct EmptyResultsError;

/// Identity of one result within one generation of a [`ResultSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultId {
    generation: u64,
    index: usize,
}

impl ResultId {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default, Clone)]
pub struct ResultSet {
    generation: u64,
    results: Vec<MatchResult>,
    selected: Option<usize>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set and clear the selection in one step.
    pub fn replace(&mut self, results: Vec<MatchResult>) {
        self.generation += 1;
        self.results = results;
        self.selected = None;
    }

    /// Replace the set and select its first element, if any.
    pub fn replace_and_select_first(&mut self, results: Vec<MatchResult>) -> Option<ResultId> {
        self.replace(results);
        self.select_first()
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    pub fn results(&self) -> &[MatchResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Results paired with their ids, in result order.
    pub fn iter(&self) -> impl Iterator<Item = (ResultId, &MatchResult)> + '_ {
        let generation = self.generation;
        self.results
            .iter()
            .enumerate()
            .map(move |(index, r)| (ResultId { generation, index }, r))
    }

    /// Handle for the result at `index` in the current generation.
    pub fn id_at(&self, index: usize) -> Option<ResultId> {
        (index < self.results.len()).then_some(ResultId {
            generation: self.generation,
            index,
        })
    }

    /// Resolve a handle; stale or out-of-range handles resolve to `None`.
    pub fn get(&self, id: ResultId) -> Option<&MatchResult> {
        if id.generation != self.generation {
            return None;
        }
        self.results.get(id.index)
    }

    /// Select the first result, or clear the selection if the set is empty.
    pub fn select_first(&mut self) -> Option<ResultId> {
        self.selected = None;
        let id = self.id_at(0)?;
        self.selected = Some(0);
        Some(id)
    }

    /// Select `id` if it belongs to the current set. Returns whether the
    /// selection changed; a stale handle leaves it untouched.
    pub fn select(&mut self, id: ResultId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.selected = Some(id.index);
        true
    }

    pub fn selected_id(&self) -> Option<ResultId> {
        self.selected.and_then(|index| self.id_at(index))
    }

    pub fn selected(&self) -> Option<&MatchResult> {
        self.selected.and_then(|index| self.results.get(index))
    }

    pub fn export_text(&self) -> Result<String, EmptyResultsError> {
        export_text(&self.results)
    }
}

/// Join results as `Page {page}: {context}` entries separated by blank lines.
pub fn export_text(results: &[MatchResult]) -> Result<String, EmptyResultsError> {
    if results.is_empty() {
        return Err(EmptyResultsError);
    }
    Ok(results
        .iter()
        .map(|r| format!("Page {}: {}", r.page, r.context))
        .collect::<Vec<_>>()
        .join("\n\n"))
}
