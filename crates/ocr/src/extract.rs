use std::sync::{Arc, OnceLock};

use orden_core::{Catalog, ExtractedRecord};
use regex::Regex;

use crate::types::{
    Extraction, MarketplaceProfile, TitleSource, SKU_NOT_DETECTED, TITLE_NOT_DETECTED,
    TITLE_NOT_IN_CATALOG,
};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_product_code, r"\b(7[0-9]{12})\b");
re!(re_units, r"(?i)([0-9]+)\s*unid(?:ad|ades)?\b");
re!(re_shipping, r"(?i)(env[ií]o[^\n]{0,60})");
re!(re_space_runs, r" {2,}");

// ── Field matchers ───────────────────────────────────────────────────────────

/// One independent rule over the whole OCR text: a pattern plus the value
/// used when the pattern does not match.
pub trait FieldMatcher {
    type Output;

    /// Column this matcher fills.
    fn column(&self) -> &'static str;

    fn find(&self, text: &str) -> Option<Self::Output>;

    fn fallback(&self) -> Self::Output;

    fn resolve(&self, text: &str) -> Self::Output {
        self.find(text).unwrap_or_else(|| {
            tracing::debug!(column = self.column(), "field not found, using fallback");
            self.fallback()
        })
    }
}

/// Marketplace product code: 13 digits starting with 7. First match wins.
pub struct ProductCode;

impl FieldMatcher for ProductCode {
    type Output = String;

    fn column(&self) -> &'static str {
        "SKU"
    }

    fn find(&self, text: &str) -> Option<String> {
        let c = re_product_code().captures(text)?;
        Some(c.get(1)?.as_str().to_string())
    }

    fn fallback(&self) -> String {
        SKU_NOT_DETECTED.to_string()
    }
}

/// A count followed by "unid", "unidad" or "unidades".
pub struct UnitCount;

impl FieldMatcher for UnitCount {
    type Output = u32;

    fn column(&self) -> &'static str {
        "Unidades"
    }

    fn find(&self, text: &str) -> Option<u32> {
        let c = re_units().captures(text)?;
        c.get(1)?.as_str().parse::<u32>().ok().filter(|&n| n >= 1)
    }

    fn fallback(&self) -> u32 {
        1
    }
}

/// The first "envío …" segment, up to 60 characters past the keyword and
/// never across a line break.
pub struct ShippingLine {
    pub default: String,
}

impl FieldMatcher for ShippingLine {
    type Output = String;

    fn column(&self) -> &'static str {
        "Envío"
    }

    fn find(&self, text: &str) -> Option<String> {
        let collapsed = re_space_runs().replace_all(text, " ");
        let c = re_shipping().captures(&collapsed)?;
        let line = c.get(1)?.as_str().trim();
        Some(line.to_string())
    }

    fn fallback(&self) -> String {
        self.default.clone()
    }
}

// ── Public extraction API ─────────────────────────────────────────────────────

/// Turns raw OCR text into a table row. Holds only read-only data, so one
/// instance serves every request.
pub struct Extractor {
    catalog: Arc<Catalog>,
    profile: MarketplaceProfile,
    code: ProductCode,
    units: UnitCount,
    shipping: ShippingLine,
}

impl Extractor {
    pub fn new(catalog: Arc<Catalog>, profile: MarketplaceProfile) -> Self {
        let shipping = ShippingLine { default: profile.default_shipping.clone() };
        Self { catalog, profile, code: ProductCode, units: UnitCount, shipping }
    }

    /// Always returns a complete row; unreadable fields get markers or
    /// defaults.
    pub fn extract(&self, ocr_text: &str) -> Extraction {
        let units = self.units.resolve(ocr_text);
        let shipping = self.shipping.resolve(ocr_text);
        let (sku, title, title_source) = self.resolve_product(ocr_text);

        Extraction {
            record: ExtractedRecord {
                sku,
                title,
                units,
                marketplace: self.profile.name.clone(),
                shipping,
            },
            title_source,
        }
    }

    fn resolve_product(&self, text: &str) -> (String, String, TitleSource) {
        if let Some(code) = self.code.find(text) {
            return match self.catalog.lookup(&code) {
                Some(entry) => (code, entry.description.clone(), TitleSource::Catalog),
                None => (code, TITLE_NOT_IN_CATALOG.to_string(), TitleSource::UnknownCode),
            };
        }

        match self.catalog.best_match(text) {
            Some((entry, score)) => (
                entry.code.clone(),
                entry.description.clone(),
                TitleSource::TokenMatch { score },
            ),
            None => (
                self.code.fallback(),
                TITLE_NOT_DETECTED.to_string(),
                TitleSource::NotDetected,
            ),
        }
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(Arc::new(Catalog::builtin()), MarketplaceProfile::default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use orden_core::CatalogEntry;

    fn extract(text: &str) -> Extraction {
        Extractor::default().extract(text)
    }

    // ── Full rows ─────────────────────────────────────────────────────────────

    #[test]
    fn known_code_units_and_shipping() {
        let text = "Orden #2000\n7501468144501\nCantidad: 3 unidades\nEnvío Full Mercado Envíos llega el martes\n";
        let e = extract(text);
        assert_eq!(e.record.sku, "7501468144501");
        assert_eq!(e.record.title, "LECHELAC LECHE DE CABRA 340 G");
        assert_eq!(e.record.units, 3);
        assert_eq!(e.record.marketplace, "Mercadolibre");
        assert_eq!(e.record.shipping, "Envío Full Mercado Envíos llega el martes");
        assert_eq!(e.title_source, TitleSource::Catalog);
    }

    #[test]
    fn single_line_order_text() {
        let text = "... 7501468144501 ... 3 unidades ... Envío Full Mercado Envíos ...";
        let r = extract(text).record;
        assert_eq!(r.sku, "7501468144501");
        assert_eq!(r.title, "LECHELAC LECHE DE CABRA 340 G");
        assert_eq!(r.units, 3);
        assert_eq!(r.marketplace, "Mercadolibre");
        assert!(r.shipping.starts_with("Envío"));
        assert!(r.shipping.chars().count() <= "Envío".chars().count() + 60);
    }

    #[test]
    fn nothing_recognizable_gets_markers_and_defaults() {
        let e = extract("Gracias por tu compra\nHola mundo");
        assert_eq!(e.record.sku, SKU_NOT_DETECTED);
        assert_eq!(e.record.title, TITLE_NOT_DETECTED);
        assert_eq!(e.record.units, 1);
        assert_eq!(e.record.shipping, "Mercado Envíos");
        assert_eq!(e.title_source, TitleSource::NotDetected);
    }

    #[test]
    fn empty_text_never_panics() {
        let e = extract("");
        assert_eq!(e.record.sku, SKU_NOT_DETECTED);
        let _ = extract("!@#$%^&*()\n\0\x01\x02 7 unid");
    }

    // ── Product code ──────────────────────────────────────────────────────────

    #[test]
    fn unknown_code_keeps_code_with_marker() {
        let e = extract("Código 7999999999999 x1");
        assert_eq!(e.record.sku, "7999999999999");
        assert_eq!(e.record.title, TITLE_NOT_IN_CATALOG);
        assert_eq!(e.title_source, TitleSource::UnknownCode);
    }

    #[test]
    fn first_code_wins() {
        let e = extract("7501468140442 y luego 7501468144501");
        assert_eq!(e.record.sku, "7501468140442");
        assert_eq!(e.record.title, "CRECELAC 0-12 M 800 GR");
    }

    #[test]
    fn code_must_be_exactly_thirteen_digits_starting_with_seven() {
        assert_eq!(ProductCode.find("75014681445012"), None);
        assert_eq!(ProductCode.find("750146814450"), None);
        assert_eq!(ProductCode.find("8501468144501"), None);
        assert_eq!(ProductCode.find("EAN:7501468144501."), Some("7501468144501".into()));
    }

    #[test]
    fn code_inside_a_longer_word_is_ignored() {
        assert_eq!(ProductCode.find("SKU7501468144501"), None);
    }

    // ── Catalog fallback ──────────────────────────────────────────────────────

    #[test]
    fn no_code_falls_back_to_description_tokens() {
        let e = extract("Crecelac Firstep 1-3 años 800 gr\n2 unidades");
        assert_eq!(e.record.sku, "7501468148301");
        assert_eq!(e.record.title, "CRECELAC FIRSTEP 1-3 AÑOS 800 GR");
        assert_eq!(e.record.units, 2);
        assert_eq!(e.title_source, TitleSource::TokenMatch { score: 6 });
    }

    #[test]
    fn fallback_tie_picks_first_catalog_entry() {
        let catalog = Catalog::new(vec![
            CatalogEntry { code: "7000000000001".into(), description: "LECHE ENTERA".into() },
            CatalogEntry { code: "7000000000002".into(), description: "LECHE DESLACTOSADA".into() },
        ])
        .unwrap();
        let extractor = Extractor::new(Arc::new(catalog), MarketplaceProfile::default());
        for _ in 0..5 {
            let e = extractor.extract("leche");
            assert_eq!(e.record.sku, "7000000000001");
            assert_eq!(e.title_source, TitleSource::TokenMatch { score: 1 });
        }
    }

    // ── Units ─────────────────────────────────────────────────────────────────

    #[test]
    fn units_variants() {
        assert_eq!(UnitCount.resolve("1 unidad"), 1);
        assert_eq!(UnitCount.resolve("12 UNIDADES"), 12);
        assert_eq!(UnitCount.resolve("4unid."), 4);
        assert_eq!(UnitCount.resolve("x 5 Unid"), 5);
    }

    #[test]
    fn units_first_match_wins() {
        assert_eq!(UnitCount.resolve("2 unidades\n7 unidades"), 2);
    }

    #[test]
    fn units_default_to_one() {
        assert_eq!(UnitCount.resolve("sin cantidad"), 1);
        assert_eq!(UnitCount.resolve("3 unidos"), 1);
        assert_eq!(UnitCount.resolve("0 unidades"), 1);
        assert_eq!(UnitCount.resolve("99999999999999999999 unidades"), 1);
    }

    // ── Shipping ──────────────────────────────────────────────────────────────

    fn shipping() -> ShippingLine {
        ShippingLine { default: "Mercado Envíos".into() }
    }

    #[test]
    fn shipping_is_case_and_accent_insensitive() {
        assert_eq!(shipping().resolve("ENVÍO GRATIS"), "ENVÍO GRATIS");
        assert_eq!(shipping().resolve("envio a domicilio"), "envio a domicilio");
    }

    #[test]
    fn shipping_stops_at_line_end() {
        assert_eq!(shipping().resolve("Envío Full\nTotal $300"), "Envío Full");
    }

    #[test]
    fn shipping_caps_trailing_characters() {
        let tail = "x".repeat(100);
        let got = shipping().resolve(&format!("Envío{tail}"));
        assert_eq!(got, format!("Envío{}", "x".repeat(60)));
    }

    #[test]
    fn shipping_collapses_space_runs() {
        assert_eq!(shipping().resolve("Envío    con   Full"), "Envío con Full");
    }

    #[test]
    fn shipping_default_comes_from_profile() {
        let profile = MarketplaceProfile {
            name: "Amazon".into(),
            default_shipping: "Amazon Prime".into(),
        };
        let e = Extractor::new(Arc::new(Catalog::builtin()), profile).extract("nada");
        assert_eq!(e.record.marketplace, "Amazon");
        assert_eq!(e.record.shipping, "Amazon Prime");
    }

    #[test]
    fn matcher_columns_match_record_headers() {
        let headers = ExtractedRecord::HEADERS;
        assert!(headers.contains(&ProductCode.column()));
        assert!(headers.contains(&UnitCount.column()));
        assert!(headers.contains(&shipping().column()));
    }
}
