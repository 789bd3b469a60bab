//! # Monster Scanner
//!
//! A backend that turns a photo of an everyday object into a collectible
//! "monster" record: a name, tags, a short narrative, scored sub-attributes,
//! a generated illustration and optionally a spoken narration.
//!
//! ## Features
//!
//! - **Content-addressed deduplication**: identical photos are answered from a
//!   TTL cache, and concurrent identical scans share a single pipeline run
//! - **Bounded collaborator calls**: retries with exponential backoff and a
//!   time budget per stage
//! - **Graceful degradation**: narration and staging are best-effort, and the
//!   generated image is embedded inline when blob storage is unavailable
//! - **Signed URLs**: S3 presigned URLs, or HMAC-SHA256 signed local URLs
//!
//! ## Architecture
//!
//! - [`pipeline`] - Request validation and the scan orchestrator
//! - [`cache`] - Content fingerprints and the TTL + LRU caches
//! - [`inference`] - AI collaborator traits and their HTTP clients
//! - [`storage`] - Blob and record stores
//! - [`media`] - Image format detection and base64 payloads
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use monster_scanner::{
//!     create_router, HttpEndpoint, HttpImageAnalyzer, HttpImageSynthesizer,
//!     MemoryRecordStore, RouterConfig, ScanService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let analyzer = HttpEndpoint::new("http://localhost:8081/analyze", "vision", None)?;
//!     let synthesizer = HttpEndpoint::new("http://localhost:8082/generate", "painter", None)?;
//!
//!     let service = ScanService::builder()
//!         .analyzer(Arc::new(HttpImageAnalyzer::new(analyzer)))
//!         .synthesizer(Arc::new(HttpImageSynthesizer::new(synthesizer)))
//!         .record_store(Arc::new(MemoryRecordStore::new()))
//!         .build();
//!
//!     let router = create_router(Arc::new(service), RouterConfig::without_auth());
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod inference;
pub mod media;
pub mod pipeline;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use cache::{fingerprint, CacheStats, FingerprintMode, Fingerprinter, TtlCache};
pub use config::{CheckConfig, Cli, Command, ServeConfig, SignConfig, SignOutputFormat};
pub use error::{PersistenceError, ScanError, StorageError, UpstreamError, ValidationError};
pub use inference::{
    Analysis, HttpEndpoint, HttpImageAnalyzer, HttpImageSynthesizer, HttpSpeechSynthesizer,
    ImageAnalyzer, ImageSynthesizer, SpeechSynthesizer, SubAttribute, SynthesizedAudio,
    SynthesizedImage,
};
pub use media::{detect_image, MediaFormat};
pub use pipeline::{
    CollectionResponse, ImageRef, MonsterRecord, PipelineSettings, ScanRequest, ScanResponse,
    ScanService, ScanServiceBuilder, Stage,
};
pub use server::{
    auth_middleware, create_dev_router, create_router, AppState, AuthError, ErrorResponse,
    HealthResponse, RouterConfig, UrlSigner,
};
pub use storage::{
    create_s3_client, BlobStore, MemoryBlobStore, MemoryRecordStore, RecordStore, S3BlobStore,
    ScanCounters,
};
