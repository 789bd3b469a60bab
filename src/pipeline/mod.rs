//! The scan pipeline.
//!
//! - [`ScanRequest`]: validated input
//! - [`ScanService`]: the orchestrator, with its [`PipelineSettings`]
//! - [`MonsterRecord`]: the persisted and cached result
//! - [`retry_with_backoff`]: the retry wrapper used for every collaborator call
//! - [`Stage`]: pipeline states, each reported as a tracing event

mod record;
mod request;
pub mod retry;
mod service;
mod stage;

#[cfg(test)]
pub(crate) mod test_support;

pub use record::{CollectionResponse, ImageRef, MonsterRecord, PipelineMetrics, ScanResponse};
pub use request::{validate_session_id, ScanRequest, DEFAULT_MAX_IMAGE_BYTES, MAX_SESSION_ID_LEN};
pub use retry::{retry_with_backoff, Retryable, RetryPolicy};
pub use service::{
    CacheStatsReport, PipelineSettings, ScanService, ScanServiceBuilder,
    DEFAULT_ANALYSIS_TIMEOUT, DEFAULT_COLLECTION_CACHE_ENTRIES, DEFAULT_COLLECTION_CACHE_TTL,
    DEFAULT_SCAN_CACHE_ENTRIES, DEFAULT_SCAN_CACHE_TTL, DEFAULT_SIGNED_URL_TTL,
    DEFAULT_SPEECH_TIMEOUT, DEFAULT_STORAGE_TIMEOUT, DEFAULT_SYNTHESIS_TIMEOUT,
};
pub use stage::{Outcome, Stage};
