use orden_core::ExtractedRecord;
use serde::{Deserialize, Serialize};

/// Marker written to the SKU column when no product could be identified.
pub const SKU_NOT_DETECTED: &str = "No detectado";
/// Marker written to the title column when no product could be identified.
pub const TITLE_NOT_DETECTED: &str = "Título no detectado";
/// Title used when a well-formed code is missing from the catalog.
pub const TITLE_NOT_IN_CATALOG: &str = "Título no encontrado en catálogo";

/// How the title column was resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TitleSource {
    /// A product code was read and found in the catalog.
    Catalog,
    /// A product code was read but the catalog does not know it.
    UnknownCode,
    /// No code was read; the description with the largest token overlap won.
    TokenMatch { score: usize },
    NotDetected,
}

impl std::fmt::Display for TitleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TitleSource::Catalog => write!(f, "catalog"),
            TitleSource::UnknownCode => write!(f, "unknown_code"),
            TitleSource::TokenMatch { score } => write!(f, "token_match({score})"),
            TitleSource::NotDetected => write!(f, "not_detected"),
        }
    }
}

/// Per-deployment marketplace constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarketplaceProfile {
    pub name: String,
    /// Shipping column value when the text has no shipping line.
    pub default_shipping: String,
}

impl Default for MarketplaceProfile {
    fn default() -> Self {
        Self {
            name: "Mercadolibre".to_string(),
            default_shipping: "Mercado Envíos".to_string(),
        }
    }
}

/// Extractor output: the table row plus how its title was obtained.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Extraction {
    pub record: ExtractedRecord,
    pub title_source: TitleSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_source_display() {
        assert_eq!(TitleSource::Catalog.to_string(), "catalog");
        assert_eq!(TitleSource::TokenMatch { score: 3 }.to_string(), "token_match(3)");
    }

    #[test]
    fn profile_defaults_fill_missing_fields() {
        let p: MarketplaceProfile = serde_json::from_str(r#"{"name":"Amazon"}"#).unwrap();
        assert_eq!(p.name, "Amazon");
        assert_eq!(p.default_shipping, "Mercado Envíos");
    }

    #[test]
    fn title_source_serializes_tagged() {
        let json = serde_json::to_value(TitleSource::TokenMatch { score: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "token_match", "score": 2}));
    }
}
