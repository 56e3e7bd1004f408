use std::collections::HashSet;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold `text` into the form used for fuzzy catalog matching: compatibility
/// decomposition, diacritics dropped, lowercase, and only alphanumerics and
/// whitespace kept.
///
/// `normalize(&normalize(s)) == normalize(s)` for every input.
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

/// Normalize and split on whitespace.
pub fn tokenize(text: &str) -> TokenSet {
    TokenSet(normalize(text).split_whitespace().map(str::to_owned).collect())
}

/// Set of normalized word tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet(HashSet<String>);

impl TokenSet {
    /// Number of tokens present in both sets.
    pub fn overlap(&self, other: &TokenSet) -> usize {
        let (small, large) = if self.0.len() <= other.0.len() {
            (&self.0, &other.0)
        } else {
            (&other.0, &self.0)
        };
        small.iter().filter(|t| large.contains(*t)).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
