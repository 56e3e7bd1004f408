pub mod extract;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use extract::{Extractor, FieldMatcher, ProductCode, ShippingLine, UnitCount};
pub use pipeline::{OrderPipeline, OrderScan, PipelineError};
pub use preprocess::{decode_image, encode_png, prepare_for_ocr, PreprocessError, PreprocessOptions};
pub use recognizer::{MockRecognizer, OcrBackend, OcrConfig, OcrError, TesseractCli};
pub use types::{Extraction, MarketplaceProfile, TitleSource};
