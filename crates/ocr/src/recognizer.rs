use image::{DynamicImage, GrayImage};
use serde::Deserialize;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::preprocess::encode_png;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image encode error: {0}")]
    ImageEncode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("OCR engine not available: {0}")]
    NotAvailable(String),
    #[error("OCR engine timed out after {0:?}")]
    Timeout(Duration),
}

/// Engine settings passed on every call.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language pack.
    pub lang: String,
    /// OCR engine mode (1 = LSTM only).
    pub oem: u8,
    /// Page segmentation mode (6 = single uniform block of text).
    pub psm: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { lang: "spa".to_string(), oem: 1, psm: 6 }
    }
}

/// Abstraction over an OCR backend.
/// One blocking call per image; implementations do not retry.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image: &GrayImage, config: &OcrConfig) -> Result<String, OcrError>;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn recognize(&self, image: &GrayImage, config: &OcrConfig) -> Result<String, OcrError> {
        (**self).recognize(image, config)
    }
}

fn to_png(image: &GrayImage) -> Result<Vec<u8>, OcrError> {
    encode_png(&DynamicImage::ImageLuma8(image.clone()))
        .map_err(|e| OcrError::ImageEncode(e.to_string()))
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string. Exercises extraction and the web
/// layer without Tesseract installed.
pub struct MockRecognizer {
    pub text: String,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image: &GrayImage, _config: &OcrConfig) -> Result<String, OcrError> {
        Ok(self.text.clone())
    }
}

// ── Tesseract executable ──────────────────────────────────────────────────────

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Pipes the image as PNG into `tesseract stdin stdout` and reads the text back.
/// With a timeout set, the process is killed once the deadline passes.
pub struct TesseractCli {
    command: String,
    timeout: Option<Duration>,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn args(config: &OcrConfig) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            config.lang.clone(),
            "--oem".to_string(),
            config.oem.to_string(),
            "--psm".to_string(),
            config.psm.to_string(),
        ]
    }

    /// Reaps the child, killing it first if the deadline passes.
    fn wait(&self, child: &mut Child) -> Result<ExitStatus, OcrError> {
        let Some(timeout) = self.timeout else {
            return child.wait().map_err(|e| OcrError::Engine(e.to_string()));
        };
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(|e| OcrError::Engine(e.to_string()))? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                if let Err(e) = child.kill() {
                    tracing::warn!(command = %self.command, "failed to kill OCR process: {e}");
                }
                if let Err(e) = child.wait() {
                    tracing::warn!(command = %self.command, "failed to reap OCR process: {e}");
                }
                return Err(OcrError::Timeout(timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn joined<T>(handle: JoinHandle<io::Result<T>>, what: &str) -> Result<T, OcrError> {
    handle
        .join()
        .map_err(|_| OcrError::Engine(format!("{what} thread panicked")))?
        .map_err(|e| OcrError::Engine(format!("{what}: {e}")))
}

impl OcrBackend for TesseractCli {
    fn recognize(&self, image: &GrayImage, config: &OcrConfig) -> Result<String, OcrError> {
        let png = to_png(image)?;

        let mut child = Command::new(&self.command)
            .args(Self::args(config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OcrError::NotAvailable(format!("{}: {e}", self.command)))?;

        // A write error only surfaces when the process exits successfully.
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(&png),
            None => Ok(()),
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child)?;
        let stdout = joined(stdout, "reading stdout")?;
        let stderr = joined(stderr, "reading stderr")?;

        if !status.success() {
            return Err(OcrError::Engine(format!(
                "{} exited with {}: {}",
                self.command,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        joined(writer, "failed to write image")?;

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

// ── Tesseract library backend (optional, gated behind `tesseract` feature) ────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{to_png, OcrBackend, OcrConfig, OcrError};
    use image::GrayImage;
    use leptess::{LepTess, Variable};

    /// In-process libtesseract. The engine mode is fixed at library init, so
    /// `OcrConfig::oem` is not applied here.
    pub struct TesseractRecognizer {
        data_path: Option<String>,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>) -> Self {
            Self { data_path }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image: &GrayImage, config: &OcrConfig) -> Result<String, OcrError> {
            let png = to_png(image)?;
            let mut lt = LepTess::new(self.data_path.as_deref(), &config.lang)
                .map_err(|e| OcrError::NotAvailable(e.to_string()))?;
            lt.set_variable(Variable::TesseditPagesegMode, &config.psm.to_string())
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::ImageEncode(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}
