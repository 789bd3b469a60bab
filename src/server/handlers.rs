//! HTTP request handlers for the monster scanner API.
//!
//! # Endpoints
//!
//! - `POST /scan` - Turn a photo into a monster record
//! - `GET /sessions/{session_id}/monsters` - A session's collection, newest first
//! - `GET /blobs/{*path}` - Download from the in-memory blob store
//! - `GET /admin/cache/stats`, `POST /admin/cache/flush`, `GET /admin/counters`
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{ScanError, StorageError, ValidationError};
use crate::pipeline::{CacheStatsReport, MonsterRecord, ScanRequest, ScanService};
use crate::storage::{BlobStore, MemoryBlobStore, ScanCounters};

/// Response header reporting whether a scan was served from the scan cache.
pub const SCAN_CACHE_HIT_HEADER: &str = "x-scan-cache-hit";

/// Response header reporting whether a collection came from the collection cache.
pub const COLLECTION_CACHE_HIT_HEADER: &str = "x-collection-cache-hit";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the scan service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState {
    /// The pipeline orchestrator
    pub service: Arc<ScanService>,

    /// Present when blobs are served by this process
    pub blob_store: Option<Arc<MemoryBlobStore>>,

    /// Hide upstream error details from clients
    pub redact_errors: bool,
}

impl AppState {
    pub fn new(service: Arc<ScanService>) -> Self {
        Self {
            service,
            blob_store: None,
            redact_errors: false,
        }
    }

    /// Serve `/blobs` from this store.
    pub fn with_blob_store(mut self, store: Arc<MemoryBlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    pub fn with_redacted_errors(mut self, redact: bool) -> Self {
        self.redact_errors = redact;
        self
    }
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            blob_store: self.blob_store.clone(),
            redact_errors: self.redact_errors,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (for client convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Error body of a scan whose record was computed but not stored.
///
/// The record is still returned so the client does not lose the monster.
#[derive(Debug, Serialize)]
pub struct RecordNotSavedResponse {
    #[serde(flatten)]
    pub error: ErrorResponse,

    pub result: MonsterRecord,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Handling
// =============================================================================

fn log_by_severity(status: StatusCode, error_type: &str, message: &str) {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else if status.is_client_error() {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }
}

/// Map a [`ScanError`] to its HTTP response.
///
/// With `redact` set, upstream and persistence causes are replaced by a
/// generic message. They are still logged in full.
pub fn scan_error_response(err: ScanError, redact: bool) -> Response {
    let error_type = err.kind();
    let status = match &err {
        ScanError::Validation(ValidationError::ImageTooLarge { .. }) => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        ScanError::Validation(_) => StatusCode::BAD_REQUEST,
        ScanError::Upstream { .. }
        | ScanError::RecordNotSaved { .. }
        | ScanError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ScanError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };

    let message = err.to_string();
    log_by_severity(status, error_type, &message);

    let client_message = match &err {
        ScanError::Upstream { stage, .. } if redact => format!("{} failed", stage),
        ScanError::RecordNotSaved { .. } if redact => "Failed to persist record".to_string(),
        ScanError::Persistence(_) if redact => "Record store error".to_string(),
        _ => message,
    };

    let error_response = ErrorResponse::with_status(error_type, client_message, status);
    match err {
        ScanError::RecordNotSaved { record, .. } => {
            let body = RecordNotSavedResponse {
                error: error_response,
                result: *record,
            };
            (status, Json(body)).into_response()
        }
        _ => (status, Json(error_response)).into_response(),
    }
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        scan_error_response(self, false)
    }
}

/// Wrapper for handler errors, carrying the redaction setting.
pub struct HandlerError {
    pub error: ScanError,
    pub redact: bool,
}

impl HandlerError {
    fn new(state: &AppState, error: impl Into<ScanError>) -> Self {
        Self {
            error: error.into(),
            redact: state.redact_errors,
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        scan_error_response(self.error, self.redact)
    }
}

/// A JSON body that could not be read. Oversized bodies keep their 413.
fn json_rejection_response(rejection: JsonRejection) -> Response {
    let status = rejection.status();
    let error_type = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else {
        "invalid_request"
    };
    let message = rejection.body_text();
    log_by_severity(status, error_type, &message);

    let error_response = ErrorResponse::with_status(error_type, message, status);
    (status, Json(error_response)).into_response()
}

/// Convert a blob store failure on the download route.
fn blob_error_response(err: StorageError) -> Response {
    let (status, error_type) = match &err {
        StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StorageError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "invalid_path"),
        StorageError::S3(_) | StorageError::Timeout { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
        }
    };
    let message = err.to_string();
    log_by_severity(status, error_type, &message);

    let error_response = ErrorResponse::with_status(error_type, message, status);
    (status, Json(error_response)).into_response()
}

fn cache_hit_response<T: Serialize>(
    header_name: &'static str,
    cache_hit: bool,
    body: T,
) -> Response {
    let mut response = Json(body).into_response();
    response.headers_mut().insert(
        header_name,
        if cache_hit {
            header::HeaderValue::from_static("true")
        } else {
            header::HeaderValue::from_static("false")
        },
    );
    response
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle scan requests.
///
/// # Endpoint
///
/// `POST /scan`
///
/// # Request
///
/// ```json
/// { "image": "<base64 or data: URI>", "session_id": "abc-123" }
/// ```
///
/// # Response
///
/// - `200 OK`: `{ "result": <record>, "cache_hit": bool }`
/// - `400 Bad Request`: missing or malformed image or session
/// - `413 Payload Too Large`: image above the configured maximum
/// - `500 Internal Server Error`: a required collaborator failed, or the
///   record could not be stored (the record is returned in `result`)
/// - `503 Service Unavailable`: a required collaborator is not configured
///
/// # Headers
///
/// - `X-Scan-Cache-Hit: true|false`
pub async fn scan_handler(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, Response> {
    let Json(body) = body.map_err(json_rejection_response)?;

    let request = ScanRequest::from_json(&body)
        .map_err(|err| HandlerError::new(&state, err).into_response())?;

    let response = state
        .service
        .handle_scan(request)
        .await
        .map_err(|err| HandlerError::new(&state, err).into_response())?;

    Ok(cache_hit_response(
        SCAN_CACHE_HIT_HEADER,
        response.cache_hit,
        &response,
    ))
}

/// Handle collection reads.
///
/// # Endpoint
///
/// `GET /sessions/{session_id}/monsters`
///
/// # Headers
///
/// - `X-Collection-Cache-Hit: true|false`
pub async fn collection_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, HandlerError> {
    let collection = state
        .service
        .list_records(&session_id)
        .await
        .map_err(|err| HandlerError::new(&state, err))?;

    Ok(cache_hit_response(
        COLLECTION_CACHE_HIT_HEADER,
        collection.cache_hit,
        &collection,
    ))
}

/// Serve an object from the in-memory blob store.
///
/// The signature has already been checked by the auth middleware.
pub async fn blob_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Response {
    let Some(store) = state.blob_store.as_ref() else {
        return blob_error_response(StorageError::NotFound(path));
    };

    match store.get(&path) {
        Ok((data, content_type)) => {
            let content_type = header::HeaderValue::from_str(&content_type)
                .unwrap_or(header::HeaderValue::from_static("application/octet-stream"));
            let mut response = Body::from(data).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                header::HeaderValue::from_static("private, max-age=3600"),
            );
            response
        }
        Err(err) => blob_error_response(err),
    }
}

/// `GET /admin/cache/stats`
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStatsReport> {
    Json(state.service.cache_stats())
}

/// `POST /admin/cache/flush`
pub async fn flush_handler(State(state): State<AppState>) -> StatusCode {
    state.service.flush_caches();
    StatusCode::NO_CONTENT
}

/// `GET /admin/counters`
pub async fn counters_handler(
    State(state): State<AppState>,
) -> Result<Json<ScanCounters>, HandlerError> {
    let counters = state
        .service
        .counters()
        .await
        .map_err(|err| HandlerError::new(&state, err))?;
    Ok(Json(counters))
}

// =============================================================================
// Tests
// =============================================================================
