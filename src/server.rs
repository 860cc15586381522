//! HTTP surface: upload a file, get its text back.
//!
//! Routes are nested under `/api/v1`:
//!
//! | Method | Path                     | Purpose                                |
//! |--------|--------------------------|----------------------------------------|
//! | POST   | `/files/process`         | multipart field `file` → text + info   |
//! | GET    | `/files/supported-types` | accepted extensions and upload limit   |
//! | GET    | `/health`                | liveness, version, uptime              |
//! | GET    | `/status`                | service details and extraction state   |
//!
//! Every response uses the same envelope:
//! `{"success": bool, "data": …}` or `{"success": false, "error": {code, message, details?}}`.
//!
//! State is built once by the caller and cloned into each handler; there is
//! no process-wide singleton.

use crate::error::ExtractError;
use crate::extract::Extractor;
use crate::processors::{FileService, ProcessedFile, SupportedTypes, MAX_UPLOAD_BYTES};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const SERVICE_NAME: &str = "filetext";

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

// ── State ────────────────────────────────────────────────────────────────────

/// Shared, immutable handler state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    files: FileService,
    extractor: Extractor,
    started: Instant,
    environment: String,
}

impl AppState {
    pub fn new(extractor: Extractor) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                files: FileService::new(extractor.clone()),
                extractor,
                started: Instant::now(),
                environment: "release".to_string(),
            }),
        }
    }

    /// Label reported by `/status` (e.g. `debug`, `release`).
    pub fn with_environment(self, environment: impl Into<String>) -> Self {
        let inner = AppStateInner {
            files: self.inner.files.clone(),
            extractor: self.inner.extractor.clone(),
            started: self.inner.started,
            environment: environment.into(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data: Some(data),
        error: None,
    })
}

/// Errors a handler can return, with their HTTP mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No file was uploaded")]
    NoFile,
    #[error("File too large")]
    FileTooLarge,
    #[error(transparent)]
    Extraction(#[from] ExtractError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let max_mb = MAX_UPLOAD_BYTES / (1024 * 1024);
        let (status, code, message, details) = match &self {
            ApiError::NoFile => (
                StatusCode::BAD_REQUEST,
                "NO_FILE",
                self.to_string(),
                Some("Send the file in the multipart field 'file'".to_string()),
            ),
            ApiError::FileTooLarge => (
                StatusCode::BAD_REQUEST,
                "FILE_TOO_LARGE",
                self.to_string(),
                Some(format!("Maximum allowed size: {max_mb}MB")),
            ),
            ApiError::Extraction(e @ ExtractError::UnsupportedFileType { .. }) => (
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_FILE_TYPE",
                e.to_string(),
                None,
            ),
            ApiError::Extraction(e) => {
                error!("File processing failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PROCESSING_ERROR",
                    e.to_string(),
                    Some(
                        "Check that the file is valid and that the extraction service is configured"
                            .to_string(),
                    ),
                )
            }
        };

        let body = Envelope::<()> {
            success: false,
            data: None,
            error: Some(ErrorDetail {
                code,
                message,
                details,
            }),
        };
        (status, Json(body)).into_response()
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the `/api/v1` router with CORS, tracing and panic catching.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/files/process", post(process_file))
        .route("/files/supported-types", get(supported_types))
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD_BYTES))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    info!("Health check: http://{}/api/v1/health", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn process_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Envelope<ProcessedFile>>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!("Rejected upload: {}", e);
        ApiError::NoFile
    })?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(ApiError::FileTooLarge)
            }
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return Err(ApiError::NoFile);
            }
        };
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::FileTooLarge
            } else {
                warn!("Failed to read upload bytes: {}", e);
                ApiError::NoFile
            }
        })?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) = upload.ok_or(ApiError::NoFile)?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::FileTooLarge);
    }

    info!(
        "Processing upload '{}' ({:.2} MiB)",
        file_name,
        bytes.len() as f64 / 1_048_576.0
    );
    let processed = state.inner.files.process(bytes, &file_name).await?;
    Ok(ok(processed))
}

async fn supported_types(State(state): State<AppState>) -> Json<Envelope<SupportedTypes>> {
    ok(state.inner.files.supported_types())
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
}

async fn health(State(state): State<AppState>) -> Json<Envelope<Health>> {
    ok(Health {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
        uptime_secs: state.inner.started.elapsed().as_secs(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub extraction_available: bool,
    pub features: Vec<&'static str>,
}

async fn status(State(state): State<AppState>) -> Json<Envelope<Status>> {
    ok(Status {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        timestamp: Utc::now(),
        environment: state.inner.environment.clone(),
        extraction_available: state.inner.extractor.is_available(),
        features: vec![
            "PDF Processing",
            "Image OCR",
            "Text Extraction",
            "DOCX Support",
            "REST API",
        ],
    })
}
