//! Clause-scoped term scanning.
//!
//! Each occurrence of a term is widened to the clause that contains it: the
//! span between the nearest boundary delimiters on either side (a comma by
//! default). Contract language is mostly comma-delimited enumerations, so a
//! clause keeps the obligation around a keyword intact where a fixed-width
//! window would cut it mid-sentence.

use regex::Regex;
use thiserror::Error;

use crate::MatchResult;
use crate::document::Document;
use crate::terms::TermSet;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid search term {term:?}: {source}")]
    Pattern {
        term: String,
        #[source]
        source: regex::Error,
    },
}

/// How a match is widened into its surrounding clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryPolicy {
    /// Character that separates clauses in flattened page text.
    pub delimiter: char,
}

impl Default for BoundaryPolicy {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl BoundaryPolicy {
    /// Pattern matching one delimiter-free run that contains `term`.
    ///
    /// The leading run is greedy, so a match starts at the beginning of the
    /// clause holding the term and ends at the next delimiter.
    fn clause_pattern(&self, term: &str) -> Result<Regex, ScanError> {
        let d = regex::escape(&self.delimiter.to_string());
        let pattern = format!("(?i)[^{d}]*{}[^{d}]*", regex::escape(term));
        Regex::new(&pattern).map_err(|source| ScanError::Pattern {
            term: term.to_string(),
            source,
        })
    }

    /// Widen `start..end` outward to the clause boundaries of `text`.
    ///
    /// Left: back to just after the previous delimiter, or start-of-text.
    /// Right: up to and including the next delimiter, or end-of-text.
    fn widen(&self, text: &str, start: usize, end: usize) -> (usize, usize) {
        let d = self.delimiter;
        let left = text[..start]
            .rfind(d)
            .map(|i| i + d.len_utf8())
            .unwrap_or(0);
        let right = text[end..]
            .find(d)
            .map(|i| end + i + d.len_utf8())
            .unwrap_or(text.len());
        (left, right)
    }
}

/// Scans documents for term occurrences.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    policy: BoundaryPolicy,
}

impl Scanner {
    pub fn new(policy: BoundaryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> BoundaryPolicy {
        self.policy
    }

    /// Find every clause-scoped occurrence of every term.
    ///
    /// Results are ordered by page, then by the term's position in `terms`,
    /// then left to right. Each term restarts from the top of the page, so
    /// contexts of different terms may overlap; repeated hits of one term
    /// inside an already reported clause are not reported again.
    pub fn scan(
        &self,
        document: &Document,
        terms: &TermSet,
    ) -> Result<Vec<MatchResult>, ScanError> {
        let patterns = terms
            .iter()
            .map(|term| Ok((term, self.policy.clause_pattern(term)?)))
            .collect::<Result<Vec<_>, ScanError>>()?;

        let mut results = Vec::new();
        for (page, text) in document.pages() {
            for (term, pattern) in &patterns {
                self.scan_page(page, text, term, pattern, &mut results);
            }
        }

        tracing::debug!(
            pages = document.page_count(),
            terms = terms.len(),
            matches = results.len(),
            "scan complete"
        );
        Ok(results)
    }

    fn scan_page(
        &self,
        page: usize,
        text: &str,
        term: &str,
        pattern: &Regex,
        out: &mut Vec<MatchResult>,
    ) {
        // find_iter resumes at the end of each clause match, which is the
        // cursor that keeps one term from reporting the same clause twice.
        for m in pattern.find_iter(text) {
            let (start, end) = self.policy.widen(text, m.start(), m.end());
            let context = text[start..end].trim();
            tracing::trace!(page, term, start, end, "term match");
            out.push(MatchResult::new(page, term, context));
        }
    }
}

/// Scan with the default comma boundary policy.
pub fn scan(document: &Document, terms: &TermSet) -> Result<Vec<MatchResult>, ScanError> {
    Scanner::default().scan(document, terms)
}
