use image::DynamicImage;
use thiserror::Error;

use crate::extract::Extractor;
use crate::preprocess::{self, PreprocessError, PreprocessOptions};
use crate::recognizer::{OcrBackend, OcrConfig, OcrError};
use crate::types::Extraction;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
}

/// The result of a single order screenshot run.
#[derive(Debug)]
pub struct OrderScan {
    /// Raw OCR text output.
    pub ocr_text: String,
    /// Structured row extracted from the OCR text.
    pub extraction: Extraction,
    /// Size of the bitmap handed to the OCR engine.
    pub ocr_dimensions: (u32, u32),
}

/// Orchestrates: preprocess → OCR → extract. Synchronous; the OCR call blocks
/// for as long as the engine takes.
pub struct OrderPipeline<R: OcrBackend> {
    recognizer: R,
    ocr_config: OcrConfig,
    preprocess: PreprocessOptions,
    extractor: Extractor,
}

impl<R: OcrBackend> OrderPipeline<R> {
    pub fn new(recognizer: R, extractor: Extractor) -> Self {
        Self {
            recognizer,
            ocr_config: OcrConfig::default(),
            preprocess: PreprocessOptions::default(),
            extractor,
        }
    }

    pub fn with_ocr_config(mut self, ocr_config: OcrConfig) -> Self {
        self.ocr_config = ocr_config;
        self
    }

    pub fn with_preprocess(mut self, preprocess: PreprocessOptions) -> Self {
        self.preprocess = preprocess;
        self
    }

    /// Decode raw upload bytes, then run [`Self::process_image`].
    pub fn process_bytes(&self, data: &[u8]) -> Result<OrderScan, PipelineError> {
        let img = preprocess::decode_image(data)?;
        self.process_image(&img)
    }

    pub fn process_image(&self, img: &DynamicImage) -> Result<OrderScan, PipelineError> {
        let prepared = preprocess::prepare_for_ocr(img, &self.preprocess);
        let ocr_dimensions = prepared.dimensions();
        tracing::debug!(
            width = img.width(),
            height = img.height(),
            ocr_width = ocr_dimensions.0,
            ocr_height = ocr_dimensions.1,
            "image prepared for OCR"
        );

        let ocr_text = self.recognizer.recognize(&prepared, &self.ocr_config)?;
        tracing::debug!(chars = ocr_text.chars().count(), "OCR finished");

        let extraction = self.extractor.extract(&ocr_text);
        tracing::info!(
            sku = %extraction.record.sku,
            units = extraction.record.units,
            title_source = %extraction.title_source,
            "order extracted"
        );

        Ok(OrderScan { ocr_text, extraction, ocr_dimensions })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockRecognizer;
    use crate::types::TitleSource;
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

    struct FailingRecognizer;

    impl OcrBackend for FailingRecognizer {
        fn recognize(&self, _image: &GrayImage, _config: &OcrConfig) -> Result<String, OcrError> {
            Err(OcrError::NotAvailable("tesseract".into()))
        }
    }

    /// Records the config it was called with and the image size.
    struct SpyRecognizer {
        seen: std::sync::Mutex<Option<(OcrConfig, (u32, u32))>>,
    }

    impl OcrBackend for SpyRecognizer {
        fn recognize(&self, image: &GrayImage, config: &OcrConfig) -> Result<String, OcrError> {
            *self.seen.lock().unwrap() = Some((config.clone(), image.dimensions()));
            Ok(String::new())
        }
    }

    fn tiny_png() -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(4, 4, |_, _| Luma([200u8]));
        preprocess::encode_png(&DynamicImage::ImageLuma8(img)).unwrap()
    }

    #[test]
    fn process_bytes_produces_extraction() {
        let pipeline = OrderPipeline::new(
            MockRecognizer::new("7501468140442\n2 unidades\nEnvío Flex"),
            Extractor::default(),
        );

        let scan = pipeline.process_bytes(&tiny_png()).unwrap();

        assert_eq!(scan.extraction.record.sku, "7501468140442");
        assert_eq!(scan.extraction.record.title, "CRECELAC 0-12 M 800 GR");
        assert_eq!(scan.extraction.record.units, 2);
        assert_eq!(scan.extraction.record.shipping, "Envío Flex");
        assert_eq!(scan.extraction.title_source, TitleSource::Catalog);
        assert_eq!(scan.ocr_text, "7501468140442\n2 unidades\nEnvío Flex");
        // 4×4 is upscaled to the default target.
        assert_eq!(scan.ocr_dimensions, (1800, 1800));
    }

    #[test]
    fn undecodable_bytes_are_a_preprocess_error() {
        let pipeline = OrderPipeline::new(MockRecognizer::new(""), Extractor::default());
        let err = pipeline.process_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, PipelineError::Preprocess(PreprocessError::Decode(_))));
    }

    #[test]
    fn ocr_failure_propagates() {
        let pipeline = OrderPipeline::new(FailingRecognizer, Extractor::default());
        let err = pipeline.process_bytes(&tiny_png()).unwrap_err();
        assert!(matches!(err, PipelineError::Ocr(OcrError::NotAvailable(_))));
    }

    #[test]
    fn configured_options_reach_the_backend() {
        let spy = SpyRecognizer { seen: std::sync::Mutex::new(None) };
        let config = OcrConfig { lang: "spa+eng".into(), oem: 1, psm: 4 };
        let pipeline = OrderPipeline::new(spy, Extractor::default())
            .with_ocr_config(config.clone())
            .with_preprocess(PreprocessOptions { target_long_side: 100, cutoff: 0.0 });

        let rgb: RgbImage = ImageBuffer::from_pixel(50, 20, Rgb([10, 20, 30]));
        let scan = pipeline.process_image(&DynamicImage::ImageRgb8(rgb)).unwrap();

        let seen = pipeline.recognizer.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.0, config);
        assert_eq!(seen.1, (100, 40));
        assert_eq!(scan.ocr_dimensions, (100, 40));
        assert_eq!(scan.extraction.title_source, TitleSource::NotDetected);
    }
}
