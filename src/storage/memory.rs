use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::{validate_object_path, BlobStore};
use crate::error::StorageError;
use crate::server::auth::UrlSigner;

/// Route under which the server serves blobs from a [`MemoryBlobStore`].
pub const BLOB_ROUTE_PREFIX: &str = "/blobs";

/// Process-local [`BlobStore`] for development and tests.
///
/// Signed URLs point back at this server's `GET /blobs/{path}` route and are
/// verified with the same [`UrlSigner`]. Contents are lost on restart.
///
/// Objects are never evicted; the store grows with every upload.
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, (Bytes, String)>>,
    signer: UrlSigner,
    base_url: String,
}

impl MemoryBlobStore {
    /// Create a store whose URLs start with `base_url` (e.g. `http://localhost:3000`).
    pub fn new(base_url: impl Into<String>, signer: UrlSigner) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            signer,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The signer that must verify `/blobs` requests.
    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.read().contains_key(path)
    }

    /// Fetch an object and its content type.
    pub fn get(&self, path: &str) -> Result<(Bytes, String), StorageError> {
        validate_object_path(path)?;
        self.objects
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        data: Bytes,
        path: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        validate_object_path(path)?;
        self.objects
            .write()
            .insert(path.to_string(), (data, content_type.to_string()));
        Ok(format!("memory://{}", path))
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError> {
        validate_object_path(path)?;
        if !self.contains(path) {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let route = format!("{}/{}", BLOB_ROUTE_PREFIX, path);
        Ok(self
            .signer
            .generate_signed_url(&self.base_url, &route, ttl, &[]))
    }
}
