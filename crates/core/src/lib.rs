pub mod catalog;
pub mod record;
pub mod tokens;

pub use catalog::{Catalog, CatalogEntry, CatalogError};
pub use record::{to_csv, ExtractedRecord, RecordError};
pub use tokens::{normalize, tokenize, TokenSet};
