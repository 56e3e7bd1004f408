use serde::{Deserialize, Serialize};
use thiserror::Error;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to flush CSV writer: {0}")]
    Flush(String),
}

/// One row of the output table, built from a single order screenshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedRecord {
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(rename = "Título de la publicación")]
    pub title: String,
    /// Always at least 1.
    #[serde(rename = "Unidades")]
    pub units: u32,
    #[serde(rename = "Marketplace")]
    pub marketplace: String,
    #[serde(rename = "Envío")]
    pub shipping: String,
}

impl ExtractedRecord {
    /// Column names, in output order.
    pub const HEADERS: [&'static str; 5] =
        ["SKU", "Título de la publicación", "Unidades", "Marketplace", "Envío"];

    /// Cell values in [`Self::HEADERS`] order.
    pub fn values(&self) -> [String; 5] {
        [
            self.sku.clone(),
            self.title.clone(),
            self.units.to_string(),
            self.marketplace.clone(),
            self.shipping.clone(),
        ]
    }
}

/// Serialize records as a BOM-prefixed UTF-8 CSV with a header row.
pub fn to_csv(records: &[ExtractedRecord]) -> Result<Vec<u8>, RecordError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(UTF8_BOM.to_vec());
    writer.write_record(ExtractedRecord::HEADERS)?;
    for record in records {
        writer.write_record(record.values())?;
    }
    writer.into_inner().map_err(|e| RecordError::Flush(e.to_string()))
}
