//! Which rendered text spans to highlight for a selected match.
//!
//! A viewer hands over the text of each span of the current page in render
//! order; the answer is span indices, independent of how they are drawn.

use std::ops::Range;

use regex::Regex;

use crate::MatchResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Highlight {
    /// The paragraph around the first span containing the term, bounded by
    /// whitespace-only spans.
    pub paragraph: Option<Range<usize>>,
    /// Every span containing the term.
    pub term_spans: Vec<usize>,
}

impl Highlight {
    pub fn is_empty(&self) -> bool {
        self.paragraph.is_none() && self.term_spans.is_empty()
    }

    pub fn in_paragraph(&self, span: usize) -> bool {
        self.paragraph.as_ref().is_some_and(|p| p.contains(&span))
    }
}

fn is_blank(span: &str) -> bool {
    span.trim().is_empty()
}

/// Compute the highlight for `selected` over the page's rendered `spans`.
///
/// Matching is case-insensitive and per span; a term split across two spans
/// is not found.
pub fn highlight<S: AsRef<str>>(spans: &[S], selected: &MatchResult) -> Highlight {
    let term = selected.term.to_lowercase();
    if term.is_empty() {
        return Highlight::default();
    }

    let term_spans: Vec<usize> = spans
        .iter()
        .enumerate()
        .filter(|(_, s)| s.as_ref().to_lowercase().contains(&term))
        .map(|(i, _)| i)
        .collect();

    let paragraph = term_spans.first().map(|&hit| {
        let start = spans[..hit]
            .iter()
            .rposition(|s| is_blank(s.as_ref()))
            .map(|i| i + 1)
            .unwrap_or(0);
        let end = spans[hit..]
            .iter()
            .position(|s| is_blank(s.as_ref()))
            .map(|i| hit + i)
            .unwrap_or(spans.len());
        start..end
    });

    Highlight {
        paragraph,
        term_spans,
    }
}

/// Byte ranges of every case-insensitive occurrence of `term` in `text`.
///
/// Unlike [`highlight`], this searches one continuous string, so a term that
/// spans several words is found as a single range.
pub fn term_spans(text: &str, term: &str) -> Vec<Range<usize>> {
    if term.trim().is_empty() {
        return Vec::new();
    }
    match Regex::new(&format!("(?i){}", regex::escape(term))) {
        Ok(re) => re.find_iter(text).map(|m| m.range()).collect(),
        Err(e) => {
            tracing::debug!(term, error = %e, "term pattern rejected");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selected(term: &str) -> MatchResult {
        MatchResult::new(1, term, "")
    }

    #[test]
    fn paragraph_is_bounded_by_blank_spans() {
        let spans = [
            "1. Definitions",
            " ",
            "2. Reporting.",
            "Business Associate shall report any Breach",
            "within 24 hours.",
            "",
            "3. Training",
            "annual breach drills",
        ];
        let h = highlight(&spans, &selected("breach"));
        assert_eq!(h.paragraph, Some(2..5));
        assert_eq!(h.term_spans, vec![3, 7]);
        assert!(h.in_paragraph(4));
        assert!(!h.in_paragraph(7));
    }

    #[test]
    fn paragraph_runs_to_page_edges_without_blanks() {
        let spans = ["Training of workforce", "members", "is required"];
        let h = highlight(&spans, &selected("TRAINING"));
        assert_eq!(h.paragraph, Some(0..3));
        assert_eq!(h.term_spans, vec![0]);
    }

    #[test]
    fn no_occurrence_highlights_nothing() {
        let spans = vec!["nothing".to_string(), "relevant".to_string()];
        let h = highlight(&spans, &selected("phi"));
        assert!(h.is_empty());
    }

    #[test]
    fn term_split_across_spans_is_not_found() {
        let spans = ["bre", "ach"];
        assert!(highlight(&spans, &selected("breach")).is_empty());
    }

    #[test]
    fn term_spans_cover_multi_word_terms() {
        let text = "the Business  Associate and a business associate agreement";
        assert_eq!(term_spans(text, "business associate"), vec![30..48]);
        assert_eq!(term_spans(text, "BUSINESS"), vec![4..12, 30..38]);
    }

    #[test]
    fn term_spans_empty_for_blank_or_absent_terms() {
        assert!(term_spans("report any breach", "  ").is_empty());
        assert!(term_spans("report any breach", "audit").is_empty());
        assert_eq!(term_spans("a+b (c)", "+b ("), vec![1..5]);
    }
}
