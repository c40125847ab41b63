//! Search term parsing.

use std::fmt;

/// Terms searched when the user supplies none.
pub const DEFAULT_TERMS: &[&str] = &["breach", "training"];

/// Separator between terms in a single search input string.
pub const TERM_DELIMITER: char = '|';

/// Ordered, case-insensitive list of search terms.
///
/// Terms are stored lowercased and trimmed. Duplicates are kept: they are
/// redundant but harmless, and the scanner reports them in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermSet {
    terms: Vec<String>,
}

impl TermSet {
    /// Parse a `|`-delimited search string.
    pub fn parse(input: &str) -> Self {
        Self::parse_with(input, TERM_DELIMITER)
    }

    /// Parse a search string split on `delimiter`. Blank entries are dropped.
    pub fn parse_with(input: &str, delimiter: char) -> Self {
        Self::from_terms(input.split(delimiter))
    }

    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn default_terms() -> Self {
        Self::from_terms(DEFAULT_TERMS)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl fmt::Display for TermSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", TERM_DELIMITER)?;
            }
            f.write_str(term)?;
        }
        Ok(())
    }
}
