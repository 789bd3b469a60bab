//! Storage collaborators: binary blobs and monster records.
//!
//! - [`BlobStore`]: object storage for scanned photos, generated images and
//!   narration audio, with time-limited signed URLs. Implemented by
//!   [`S3BlobStore`] and [`MemoryBlobStore`].
//! - [`RecordStore`]: the document store holding monster records and the
//!   aggregate scan counters. Implemented by [`MemoryRecordStore`].
//!
//! Object paths are built with [`scan_object_path`], [`monster_object_path`]
//! and [`audio_object_path`] so both blob stores lay objects out the same way.

mod memory;
mod records;
mod s3;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

pub use memory::{MemoryBlobStore, BLOB_ROUTE_PREFIX};
pub use records::{MemoryRecordStore, RecordStore, ScanCounters};
pub use s3::{create_s3_client, S3BlobStore};

/// Object storage with signed read URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `path`, returning the store's URI for the object.
    async fn upload(
        &self,
        data: Bytes,
        path: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// A URL granting read access to `path` for `ttl`.
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Path of a staged source photo: `scans/{session}/{fingerprint}.{ext}`.
pub fn scan_object_path(session_id: &str, fingerprint: &str, extension: &str) -> String {
    format!("scans/{}/{}.{}", session_id, fingerprint, extension)
}

/// Path of a generated monster image: `monsters/{session}/{id}.{ext}`.
pub fn monster_object_path(session_id: &str, record_id: &str, extension: &str) -> String {
    format!("monsters/{}/{}.{}", session_id, record_id, extension)
}

/// Path of narration audio: `audio/{session}/{id}.{ext}`.
pub fn audio_object_path(session_id: &str, record_id: &str, extension: &str) -> String {
    format!("audio/{}/{}.{}", session_id, record_id, extension)
}

/// Reject paths that could escape the store's namespace.
pub fn validate_object_path(path: &str) -> Result<(), StorageError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}
