//! Server settings: optional TOML file plus a `PORT` override.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use orden_core::{Catalog, CatalogError};
use orden_ocr::{MarketplaceProfile, OcrConfig, PreprocessOptions};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "ORDEN_CONFIG";
/// Settings file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "orden.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid listen address `{0}`")]
    InvalidListenAddr(String),
    #[error("invalid PORT value `{0}`")]
    InvalidPort(String),
    #[error("catalog {path}: {source}")]
    Catalog {
        path: PathBuf,
        #[source]
        source: CatalogError,
    },
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackendKind {
    /// Spawn the `tesseract` executable.
    #[default]
    Cli,
    /// Link libtesseract in-process (needs the `tesseract` feature).
    Library,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrSettings {
    pub backend: OcrBackendKind,
    /// Executable used by the `cli` backend.
    pub command: String,
    /// Tessdata directory for the `library` backend.
    pub data_path: Option<String>,
    #[serde(flatten)]
    pub engine: OcrConfig,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            backend: OcrBackendKind::Cli,
            command: "tesseract".to_string(),
            data_path: None,
            engine: OcrConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub listen_addr: String,
    pub max_upload_bytes: usize,
    pub ocr_timeout_secs: u64,
    /// TOML product catalog; the built-in one is used when unset.
    pub catalog_path: Option<PathBuf>,
    pub ocr: OcrSettings,
    pub marketplace: MarketplaceProfile,
    pub preprocess: PreprocessOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            max_upload_bytes: 6 * 1024 * 1024,
            ocr_timeout_secs: 60,
            catalog_path: None,
            ocr: OcrSettings::default(),
            marketplace: MarketplaceProfile::default(),
            preprocess: PreprocessOptions::default(),
        }
    }
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&content)
    }

    /// Settings file from `ORDEN_CONFIG`, else `./orden.toml` if it exists,
    /// else defaults; then `PORT` replaces the listen port.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV).map(PathBuf::from).or_else(|| {
            let p = PathBuf::from(DEFAULT_CONFIG_FILE);
            p.exists().then_some(p)
        });

        let mut settings = match path {
            Some(p) => {
                tracing::info!(path = %p.display(), "loading settings");
                Self::from_file(&p)?
            }
            None => Self::default(),
        };

        if let Ok(port) = std::env::var("PORT") {
            settings.override_port(&port)?;
        }
        Ok(settings)
    }

    pub fn override_port(&mut self, port: &str) -> Result<(), ConfigError> {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;
        let mut addr = self.socket_addr()?;
        addr.set_port(port);
        self.listen_addr = addr.to_string();
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(self.listen_addr.clone()))
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    pub fn load_catalog(&self) -> Result<Catalog, ConfigError> {
        let Some(path) = &self.catalog_path else {
            return Ok(Catalog::builtin());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        Catalog::from_toml(&content)
            .map_err(|source| ConfigError::Catalog { path: path.clone(), source })
    }
}
