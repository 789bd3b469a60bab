//! General API tests.
//!
//! Tests verify:
//! - Health check
//! - Aggregate counters
//! - Persistence failure still returns the computed record
//! - Unknown routes and methods

use async_trait::async_trait;
use axum::http::{Method, Request, StatusCode};
use std::sync::Arc;

use monster_scanner::error::PersistenceError;
use monster_scanner::pipeline::{MonsterRecord, ScanService};
use monster_scanner::storage::{MemoryRecordStore, RecordStore, ScanCounters};
use monster_scanner::{create_router, RouterConfig};

use super::test_utils::{
    body_json, fast_settings, png_payload, scan_body, MockAnalyzer, MockSynthesizer, TestApp,
};

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_counters_track_pipeline_runs() {
    let app = TestApp::new();
    let image = png_payload(100, 1);

    app.scan(&image, "session-a").await;
    app.scan(&png_payload(100, 2), "session-a").await;
    app.scan(&png_payload(100, 3), "session-b").await;
    // Cache hits do not run the pipeline
    app.scan(&image, "session-a").await;

    let json = body_json(app.get("/admin/counters").await).await;
    assert_eq!(json["total_scans"], 3);
    assert_eq!(json["sessions"], 2);
}

#[tokio::test]
async fn test_unknown_route_and_method() {
    let app = TestApp::new();

    assert_eq!(app.get("/nope").await.status(), StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/scan")
        .body(axum::body::Body::empty())
        .unwrap();
    assert_eq!(
        app.send(request).await.status(),
        StatusCode::METHOD_NOT_ALLOWED
    );
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = TestApp::new();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/scan")
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "POST")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}

// =============================================================================
// Persistence Failure
// =============================================================================

/// Record store that reads fine but refuses writes.
struct ReadOnlyRecordStore(MemoryRecordStore);

#[async_trait]
impl RecordStore for ReadOnlyRecordStore {
    async fn save_record(&self, _record: &MonsterRecord) -> Result<(), PersistenceError> {
        Err(PersistenceError::Backend("quota exceeded".to_string()))
    }

    async fn list_records(&self, session_id: &str) -> Result<Vec<MonsterRecord>, PersistenceError> {
        self.0.list_records(session_id).await
    }

    async fn increment_counters(&self, session_id: &str) -> Result<ScanCounters, PersistenceError> {
        self.0.increment_counters(session_id).await
    }

    async fn counters(&self) -> Result<ScanCounters, PersistenceError> {
        self.0.counters().await
    }
}

#[tokio::test]
async fn test_record_not_saved_returns_record() {
    use tower::ServiceExt;

    let analyzer = MockAnalyzer::new();
    let service = ScanService::builder()
        .analyzer(Arc::new(analyzer.clone()))
        .synthesizer(Arc::new(MockSynthesizer::new()))
        .record_store(Arc::new(ReadOnlyRecordStore(MemoryRecordStore::new())))
        .settings(fast_settings())
        .build();
    let service = Arc::new(service);
    let router = create_router(Arc::clone(&service), RouterConfig::without_auth());

    let image = png_payload(100, 4);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/scan")
        .header("content-type", "application/json")
        .body(scan_body(&image, "session-a"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(json["error"], "record_not_saved");
    assert_eq!(json["result"]["attributes"]["name"], "Lampyre");
    // Without a blob store the image is embedded
    assert_eq!(json["result"]["image"]["kind"], "embedded");

    // Nothing was cached, so a retry runs the pipeline again
    assert_eq!(service.cache_stats().scan_cache.current_size, 0);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/scan")
        .header("content-type", "application/json")
        .body(scan_body(&image, "session-a"))
        .unwrap();
    router.oneshot(request).await.unwrap();
    assert_eq!(analyzer.calls(), 2);
}
