//! Web front-end: upload an order screenshot, get back a one-row table and CSV.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use orden_ocr::{Extractor, OcrBackend, OrderPipeline, TesseractCli};
use tracing_subscriber::EnvFilter;

mod config;
mod render;
mod routes;

use config::{OcrBackendKind, OcrSettings, Settings};
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load().context("failed to load settings")?;
    let catalog = settings.load_catalog().context("failed to load catalog")?;
    tracing::info!(products = catalog.len(), "catalog ready");

    let extractor = Extractor::new(Arc::new(catalog), settings.marketplace.clone());
    let backend = build_backend(&settings.ocr, settings.ocr_timeout())?;
    let pipeline = OrderPipeline::new(backend, extractor)
        .with_ocr_config(settings.ocr.engine.clone())
        .with_preprocess(settings.preprocess.clone());

    let state = AppState {
        pipeline: Arc::new(pipeline),
        ocr_timeout: settings.ocr_timeout(),
    };
    let app = routes::router(state, settings.max_upload_bytes);

    let addr = settings.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!(%addr, backend = ?settings.ocr.backend, lang = %settings.ocr.engine.lang, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server shutdown complete");
    Ok(())
}

fn build_backend(ocr: &OcrSettings, timeout: Duration) -> anyhow::Result<Box<dyn OcrBackend>> {
    match ocr.backend {
        OcrBackendKind::Cli => {
            Ok(Box::new(TesseractCli::new(ocr.command.clone()).with_timeout(timeout)))
        }
        #[cfg(feature = "tesseract")]
        OcrBackendKind::Library => Ok(Box::new(
            orden_ocr::recognizer::tesseract_backend::TesseractRecognizer::new(
                ocr.data_path.clone(),
            ),
        )),
        #[cfg(not(feature = "tesseract"))]
        OcrBackendKind::Library => {
            anyhow::bail!("the `library` OCR backend needs the `tesseract` feature")
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
