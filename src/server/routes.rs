//! Router configuration for the monster scanner.
//!
//! This module defines the HTTP routes and applies middleware for
//! authentication, body limits, CORS and tracing.
//!
//! # Route Structure
//!
//! ```text
//! /health                              - Health check (public)
//! /scan                                - Scan a photo (public)
//! /sessions/{session_id}/monsters      - Session collection (public)
//! /blobs/{*path}                       - Local blob download (signed URL)
//! /admin/cache/stats                   - Cache statistics (protected)
//! /admin/cache/flush                   - Flush caches (protected)
//! /admin/counters                      - Aggregate counters (protected)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use monster_scanner::server::routes::{create_router, RouterConfig};
//! use monster_scanner::pipeline::ScanService;
//!
//! let service = ScanService::builder()
//!     .analyzer(analyzer)
//!     .synthesizer(synthesizer)
//!     .record_store(records)
//!     .build();
//!
//! let config = RouterConfig::new("my-secret-key")
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(Arc::new(service), config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, UrlSigner};
use super::handlers::{
    blob_handler, cache_stats_handler, collection_handler, counters_handler, flush_handler,
    health_handler, scan_handler, AppState,
};
use crate::pipeline::{ScanService, DEFAULT_MAX_IMAGE_BYTES};
use crate::storage::{MemoryBlobStore, BLOB_ROUTE_PREFIX};

/// Room for the JSON envelope, the session id and a `data:` prefix.
pub const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Largest request body that can carry an image of `max_image_bytes` as base64.
pub fn body_limit_for(max_image_bytes: usize) -> usize {
    max_image_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(BODY_LIMIT_SLACK)
}

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Secret key for signed admin URLs
    pub auth_secret: String,

    /// Whether the admin routes require a signature
    pub auth_enabled: bool,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Request body limit in bytes
    pub max_body_bytes: usize,

    /// Hide upstream error details from clients
    pub redact_errors: bool,

    /// Local blob store to serve under `/blobs`
    pub blob_store: Option<Arc<MemoryBlobStore>>,
}

impl RouterConfig {
    /// Create a new router configuration with the given auth secret.
    ///
    /// By default:
    /// - Admin authentication is enabled
    /// - CORS allows any origin
    /// - Tracing is enabled
    /// - The body limit fits the default maximum image size
    pub fn new(auth_secret: impl Into<String>) -> Self {
        Self {
            auth_secret: auth_secret.into(),
            auth_enabled: true,
            cors_origins: None,
            enable_tracing: true,
            max_body_bytes: body_limit_for(DEFAULT_MAX_IMAGE_BYTES),
            redact_errors: false,
            blob_store: None,
        }
    }

    /// Create a configuration with admin authentication disabled.
    ///
    /// **Warning**: This should only be used for development/testing.
    pub fn without_auth() -> Self {
        Self {
            auth_enabled: false,
            ..Self::new(String::new())
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable admin authentication.
    pub fn with_auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Size the body limit for images up to `max_image_bytes`.
    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_body_bytes = body_limit_for(max_image_bytes);
        self
    }

    pub fn with_redacted_errors(mut self, redact: bool) -> Self {
        self.redact_errors = redact;
        self
    }

    /// Serve `/blobs/{*path}` from `store`, verified with its signer.
    pub fn with_blob_store(mut self, store: Arc<MemoryBlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// This function builds the complete Axum router with:
/// - Public routes (health, scan, collections)
/// - Admin routes (signed URL auth when enabled)
/// - The blob download route when a local blob store is configured
/// - Body limit, CORS and optional request tracing
pub fn create_router(service: Arc<ScanService>, config: RouterConfig) -> Router {
    let mut app_state = AppState::new(service).with_redacted_errors(config.redact_errors);
    if let Some(store) = &config.blob_store {
        app_state = app_state.with_blob_store(Arc::clone(store));
    }

    let cors = build_cors_layer(&config);

    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/scan", post(scan_handler))
        .route("/sessions/{session_id}/monsters", get(collection_handler))
        .with_state(app_state.clone());

    let mut router = Router::new()
        .merge(public_routes)
        .merge(build_admin_routes(app_state.clone(), &config));

    if let Some(store) = &config.blob_store {
        router = router.merge(build_blob_routes(app_state, store.signer().clone()));
    }

    let router = router
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Admin routes, behind signed URL auth only when `auth_enabled` is set.
///
/// `serve` leaves admin auth off unless started with `--auth-enabled true`.
fn build_admin_routes(app_state: AppState, config: &RouterConfig) -> Router {
    let admin_routes = Router::new()
        .route("/admin/cache/stats", get(cache_stats_handler))
        .route("/admin/cache/flush", post(flush_handler))
        .route("/admin/counters", get(counters_handler))
        .with_state(app_state);

    if config.auth_enabled {
        admin_routes.layer(middleware::from_fn_with_state(
            UrlSigner::new(&config.auth_secret),
            auth_middleware,
        ))
    } else {
        admin_routes
    }
}

/// Blob downloads are always signature-checked, independent of admin auth.
fn build_blob_routes(app_state: AppState, signer: UrlSigner) -> Router {
    Router::new()
        .route(&format!("{}/{{*path}}", BLOB_ROUTE_PREFIX), get(blob_handler))
        .with_state(app_state)
        .layer(middleware::from_fn_with_state(signer, auth_middleware))
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .expose_headers([
            http::HeaderName::from_static(super::handlers::SCAN_CACHE_HIT_HEADER),
            http::HeaderName::from_static(super::handlers::COLLECTION_CACHE_HIT_HEADER),
        ])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Create a development router with admin authentication disabled.
///
/// **Warning**: This should only be used for local development and testing.
pub fn create_dev_router(service: Arc<ScanService>) -> Router {
    create_router(service, RouterConfig::without_auth())
}

// =============================================================================
// Tests
// =============================================================================
