//! HTTP handlers. Each upload runs the OCR pipeline once on a blocking thread.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use orden_core::{to_csv, ExtractedRecord, RecordError};
use orden_ocr::{
    decode_image, encode_png, OcrBackend, OcrError, OrderPipeline, OrderScan, PipelineError,
    PreprocessError, TitleSource,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::render::{self, ResultView};

const UPLOAD_FIELD: &str = "image";
const CSV_FILENAME: &str = "orden_ocr.csv";

pub type SharedPipeline = Arc<OrderPipeline<Box<dyn OcrBackend>>>;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: SharedPipeline,
    pub ocr_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    Upload { status: StatusCode, message: String },
    #[error("No se pudo leer la imagen: {0}")]
    InvalidImage(String),
    #[error("Falló el OCR: {0}")]
    Ocr(String),
    #[error("El OCR tardó más de {0} s")]
    Timeout(u64),
    #[error("Error interno: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            AppError::Upload { status, .. } => *status,
            AppError::Ocr(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Preprocess(PreprocessError::Decode(e)) => {
                AppError::InvalidImage(e.to_string())
            }
            PipelineError::Preprocess(e) => AppError::Internal(e.to_string()),
            PipelineError::Ocr(OcrError::Timeout(limit)) => AppError::Timeout(limit.as_secs()),
            PipelineError::Ocr(e) => AppError::Ocr(e.to_string()),
        }
    }
}

impl From<RecordError> for AppError {
    fn from(e: RecordError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        AppError::Upload { status: e.status(), message: e.body_text() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        }
        let message = self.to_string();
        (status, Html(render::page(None, Some(message.as_str())))).into_response()
    }
}

/// JSON flavour of [`AppError`] for the API route.
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self.0, "api request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index).post(upload))
        .route("/download", post(download))
        .route("/api/extract", post(api_extract))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn index() -> Html<String> {
    Html(render::page(None, None))
}

async fn upload(State(state): State<AppState>, multipart: Multipart) -> Result<Html<String>, AppError> {
    let Some(data) = read_image_field(multipart).await? else {
        return Ok(Html(render::page(None, None)));
    };

    let processed = run_pipeline(&state, data).await?;
    let records = [processed.scan.extraction.record];
    let csv_b64 = STANDARD.encode(to_csv(&records)?);

    let view = ResultView {
        preview_png_b64: &processed.preview_png_b64,
        records: &records,
        csv_b64: &csv_b64,
        ocr_text: &processed.scan.ocr_text,
    };
    Ok(Html(render::page(Some(&view), None)))
}

#[derive(Debug, Deserialize)]
pub struct DownloadForm {
    #[serde(default)]
    csv: String,
}

async fn download(Form(form): Form<DownloadForm>) -> Response {
    if form.csv.is_empty() {
        return (StatusCode::BAD_REQUEST, "No hay datos").into_response();
    }
    let raw = match STANDARD.decode(form.csv.trim()) {
        Ok(raw) => raw,
        Err(_) => return (StatusCode::BAD_REQUEST, "CSV inválido").into_response(),
    };
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{CSV_FILENAME}\""),
            ),
        ],
        raw,
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub record: ExtractedRecord,
    pub title_source: TitleSource,
    pub ocr_text: String,
}

async fn api_extract(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let data = read_image_field(multipart)
        .await?
        .ok_or_else(|| AppError::BadRequest(format!("missing `{UPLOAD_FIELD}` field")))?;
    let processed = run_pipeline(&state, data).await?;
    let OrderScan { ocr_text, extraction, .. } = processed.scan;
    Ok(Json(ExtractResponse {
        record: extraction.record,
        title_source: extraction.title_source,
        ocr_text,
    }))
}

/// Bytes of the `image` field; `None` when the field is absent or the
/// browser sent an empty file.
async fn read_image_field(mut multipart: Multipart) -> Result<Option<Bytes>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            let data = field.bytes().await?;
            return Ok((!data.is_empty()).then_some(data));
        }
    }
    Ok(None)
}

struct Processed {
    scan: OrderScan,
    preview_png_b64: String,
}

/// 8-bit RGB copy of the upload; float and 16-bit sources are not all
/// PNG-encodable as decoded.
fn preview_png(img: &DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    encode_png(&DynamicImage::ImageRgb8(img.to_rgb8()))
}

/// Decode, run the pipeline and build the preview off the async runtime.
/// The timeout abandons the wait. Killing the engine is up to the backend's
/// own deadline.
async fn run_pipeline(state: &AppState, data: Bytes) -> Result<Processed, AppError> {
    let pipeline = Arc::clone(&state.pipeline);
    let task = tokio::task::spawn_blocking(move || -> Result<Processed, AppError> {
        let img = decode_image(&data).map_err(PipelineError::from)?;
        let scan = pipeline.process_image(&img)?;
        let preview = preview_png(&img).map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Processed { scan, preview_png_b64: STANDARD.encode(preview) })
    });

    match tokio::time::timeout(state.ocr_timeout, task).await {
        Err(_) => Err(AppError::Timeout(state.ocr_timeout.as_secs())),
        Ok(Err(join)) => Err(AppError::Internal(join.to_string())),
        Ok(Ok(result)) => result,
    }
}
