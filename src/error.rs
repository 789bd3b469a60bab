use thiserror::Error;

use crate::pipeline::{MonsterRecord, Stage};

/// Caller errors detected before any collaborator is contacted.
///
/// These are the only user-correctable failures of a scan and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No image payload (absent field or zero bytes)
    #[error("Missing image payload")]
    MissingImage,

    /// Image field present but not usable as image bytes
    #[error("Invalid image payload: {0}")]
    InvalidImage(String),

    /// Image larger than the configured maximum (should map to HTTP 413)
    #[error("Image too large: {size} bytes exceeds the maximum of {max} bytes")]
    ImageTooLarge { size: usize, max: usize },

    /// No session identifier
    #[error("Missing session identifier")]
    MissingSession,

    /// Session identifier present but malformed
    #[error("Invalid session identifier: {0}")]
    InvalidSession(String),
}

/// Errors from the AI collaborators (image understanding, synthesis, speech).
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Request could not be sent or the connection failed
    #[error("Upstream request failed: {0}")]
    Request(String),

    /// Collaborator answered with a non-success status
    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response did not match the expected schema
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    /// Call exceeded its stage budget
    #[error("Upstream call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

impl UpstreamError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Client errors other than 408 and 429 are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            _ => true,
        }
    }
}

/// Errors from the blob store.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Object path rejected by the store
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    /// Store-side operation timed out
    #[error("Storage operation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Errors from the record (document) store.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("Record store error: {0}")]
    Backend(String),
}

/// Failure of a scan request or of a collection read.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A required AI collaborator failed after retries were exhausted
    #[error("{stage} failed: {source}")]
    Upstream {
        stage: Stage,
        #[source]
        source: UpstreamError,
    },

    /// The record was computed but could not be written to the record store
    #[error("Failed to persist record: {source}")]
    RecordNotSaved {
        #[source]
        source: PersistenceError,
        record: Box<MonsterRecord>,
    },

    /// The record store could not be read
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// A required collaborator is not configured at all
    #[error("Service unavailable: no {collaborator} configured")]
    ServiceUnavailable { collaborator: &'static str },
}

impl ScanError {
    /// Short machine-readable label for logs and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::Validation(ValidationError::ImageTooLarge { .. }) => "payload_too_large",
            ScanError::Validation(_) => "invalid_request",
            ScanError::Upstream { .. } => "upstream_error",
            ScanError::RecordNotSaved { .. } => "record_not_saved",
            ScanError::Persistence(_) => "persistence_error",
            ScanError::ServiceUnavailable { .. } => "service_unavailable",
        }
    }
}
