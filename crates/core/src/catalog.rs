use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tokens::{tokenize, TokenSet};

/// Number of digits in a marketplace product code.
pub const CODE_LEN: usize = 13;

const BUILTIN: &[(&str, &str)] = &[
    ("7501468140442", "CRECELAC 0-12 M 800 GR"),
    ("7501468145508", "CRECELAC 0-12 M 400 GR"),
    ("7501468148103", "CRECELAC FIRSTEP 1-3 AÑOS 360 GR"),
    ("7501468148301", "CRECELAC FIRSTEP 1-3 AÑOS 800 GR"),
    ("7501468141043", "CRECELAC 0-12 M 1.5 KG"),
    ("7501468140947", "CRECELAC FIRSTEP 1-3 AÑOS 1.5 KG"),
    ("7501468144501", "LECHELAC LECHE DE CABRA 340 G"),
];

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("Invalid product code '{0}': expected 13 ASCII digits")]
    InvalidCode(String),
    #[error("Duplicate product code '{0}'")]
    DuplicateCode(String),
    #[error("Empty description for product code '{0}'")]
    EmptyDescription(String),
    #[error("Failed to parse catalog TOML: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "product")]
    products: Vec<CatalogEntry>,
}

/// Read-only product table with the token set of every description
/// precomputed. Entries keep their declaration order, which decides ties in
/// [`Catalog::best_match`].
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    tokens: Vec<TokenSet>,
    by_code: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        let mut by_code = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            if !is_valid_code(&entry.code) {
                return Err(CatalogError::InvalidCode(entry.code.clone()));
            }
            if entry.description.trim().is_empty() {
                return Err(CatalogError::EmptyDescription(entry.code.clone()));
            }
            if by_code.insert(entry.code.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateCode(entry.code.clone()));
            }
        }
        Ok(Self::indexed(entries, by_code))
    }

    /// The catalog shipped with the current deployment.
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(code, description)| CatalogEntry {
                code: (*code).to_string(),
                description: (*description).to_string(),
            })
            .collect::<Vec<_>>();
        let by_code = entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.code.clone(), idx))
            .collect();
        Self::indexed(entries, by_code)
    }

    fn indexed(entries: Vec<CatalogEntry>, by_code: HashMap<String, usize>) -> Self {
        let tokens = entries.iter().map(|e| tokenize(&e.description)).collect();
        Self { entries, tokens, by_code }
    }

    /// Parse a catalog file of `[[product]]` tables:
    ///
    /// ```toml
    /// [[product]]
    /// code = "7501468140442"
    /// description = "CRECELAC 0-12 M 800 GR"
    /// ```
    pub fn from_toml(toml_content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            toml::from_str(toml_content).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(file.products)
    }

    pub fn lookup(&self, code: &str) -> Option<&CatalogEntry> {
        self.by_code.get(code).map(|&idx| &self.entries[idx])
    }

    /// Entry whose description shares the most tokens with `text`.
    ///
    /// Only a strictly greater score replaces the current best, so the first
    /// entry in catalog order wins a tie. A best score of 0 is no match.
    pub fn best_match(&self, text: &str) -> Option<(&CatalogEntry, usize)> {
        let text_tokens = tokenize(text);
        let mut best: Option<(usize, usize)> = None;
        for (idx, desc_tokens) in self.tokens.iter().enumerate() {
            let score = text_tokens.overlap(desc_tokens);
            if score > best.map_or(0, |(_, s)| s) {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, score)| (&self.entries[idx], score))
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}
