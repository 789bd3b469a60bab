//! HTTP server layer for the monster scanner.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │      POST /scan    GET /sessions/{id}/monsters    /admin/...    │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │ (signed URL)│  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │
//!                       pipeline::ScanService
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{auth_middleware, AuthError, UrlSigner};
pub use handlers::{
    blob_handler, cache_stats_handler, collection_handler, counters_handler, flush_handler,
    health_handler, scan_error_response, scan_handler, AppState, ErrorResponse, HandlerError,
    HealthResponse, RecordNotSavedResponse, COLLECTION_CACHE_HIT_HEADER, SCAN_CACHE_HIT_HEADER,
};
pub use routes::{body_limit_for, create_dev_router, create_router, RouterConfig, BODY_LIMIT_SLACK};
