//! Cache behaviour through the HTTP surface.
//!
//! Tests verify:
//! - Collection reads are cached and invalidated by new scans
//! - Scan cache expiry and capacity eviction
//! - Flushing resets contents and statistics

use axum::http::StatusCode;
use std::time::Duration;

use super::test_utils::{body_json, header_str, png_payload, TestApp, TestAppOptions};

// =============================================================================
// Collection Cache
// =============================================================================

#[tokio::test]
async fn test_collection_read_is_cached() {
    let app = TestApp::new();

    let response = app.get("/sessions/session-a/monsters").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-collection-cache-hit"), Some("false"));
    let json = body_json(response).await;
    assert_eq!(json["session_id"], "session-a");
    assert!(json["records"].as_array().unwrap().is_empty());

    let response = app.get("/sessions/session-a/monsters").await;
    assert_eq!(header_str(&response, "x-collection-cache-hit"), Some("true"));
    assert_eq!(body_json(response).await["cache_hit"], true);
}

#[tokio::test]
async fn test_scan_invalidates_collection() {
    let app = TestApp::new();

    // Warm the collection cache with an empty list
    app.get("/sessions/session-a/monsters").await;
    app.get("/sessions/session-a/monsters").await;

    let first = body_json(app.scan(&png_payload(100, 1), "session-a").await).await;

    let response = app.get("/sessions/session-a/monsters").await;
    assert_eq!(header_str(&response, "x-collection-cache-hit"), Some("false"));
    let json = body_json(response).await;
    assert_eq!(json["records"].as_array().unwrap().len(), 1);
    assert_eq!(json["records"][0]["id"], first["result"]["id"]);

    let second = body_json(app.scan(&png_payload(100, 2), "session-a").await).await;

    let json = body_json(app.get("/sessions/session-a/monsters").await).await;
    let records = json["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["id"], second["result"]["id"]);
    assert_eq!(records[1]["id"], first["result"]["id"]);
}

#[tokio::test]
async fn test_scan_only_invalidates_its_own_session() {
    let app = TestApp::new();

    app.get("/sessions/session-b/monsters").await;
    app.scan(&png_payload(100, 3), "session-a").await;

    let response = app.get("/sessions/session-b/monsters").await;
    assert_eq!(header_str(&response, "x-collection-cache-hit"), Some("true"));
}

#[tokio::test]
async fn test_invalid_session_in_path() {
    let app = TestApp::new();

    let response = app.get("/sessions/not%20valid/monsters").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test(start_paused = true)]
async fn test_collection_cache_expires() {
    let app = TestApp::build(TestAppOptions {
        collection_cache: Some((16, Duration::from_secs(60))),
        ..TestAppOptions::default()
    });

    app.get("/sessions/session-a/monsters").await;
    tokio::time::advance(Duration::from_secs(59)).await;
    let response = app.get("/sessions/session-a/monsters").await;
    assert_eq!(header_str(&response, "x-collection-cache-hit"), Some("true"));

    tokio::time::advance(Duration::from_secs(2)).await;
    let response = app.get("/sessions/session-a/monsters").await;
    assert_eq!(header_str(&response, "x-collection-cache-hit"), Some("false"));
}

// =============================================================================
// Scan Cache
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_scan_cache_expires() {
    let app = TestApp::build(TestAppOptions {
        scan_cache: Some((16, Duration::from_secs(3600))),
        ..TestAppOptions::default()
    });
    let image = png_payload(300, 4);

    app.scan(&image, "session-a").await;
    tokio::time::advance(Duration::from_secs(3599)).await;
    assert_eq!(body_json(app.scan(&image, "session-a").await).await["cache_hit"], true);
    assert_eq!(app.analyzer.calls(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(body_json(app.scan(&image, "session-a").await).await["cache_hit"], false);
    assert_eq!(app.analyzer.calls(), 2);

    let stats = app.service.cache_stats().scan_cache;
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.current_size, 1);
}

#[tokio::test]
async fn test_scan_cache_evicts_oldest_at_capacity() {
    let app = TestApp::build(TestAppOptions {
        scan_cache: Some((2, Duration::from_secs(3600))),
        ..TestAppOptions::default()
    });

    let first = png_payload(200, 5);
    app.scan(&first, "session-a").await;
    app.scan(&png_payload(200, 6), "session-a").await;
    app.scan(&png_payload(200, 7), "session-a").await;

    let stats = app.service.cache_stats().scan_cache;
    assert_eq!(stats.current_size, 2);
    assert_eq!(stats.evictions, 1);

    // The first photo was evicted and runs the pipeline again
    assert_eq!(body_json(app.scan(&first, "session-a").await).await["cache_hit"], false);
    assert_eq!(app.analyzer.calls(), 4);
}

// =============================================================================
// Admin Endpoints
// =============================================================================

#[tokio::test]
async fn test_cache_stats_endpoint() {
    let app = TestApp::new();
    let image = png_payload(150, 8);

    app.scan(&image, "session-a").await;
    app.scan(&image, "session-a").await;
    app.get("/sessions/session-a/monsters").await;

    let response = app.get("/admin/cache/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert_eq!(json["scan_cache"]["hits"], 1);
    assert_eq!(json["scan_cache"]["misses"], 1);
    assert_eq!(json["scan_cache"]["current_size"], 1);
    assert_eq!(json["scan_cache"]["max_entries"], 256);
    assert_eq!(json["scan_cache"]["ttl_secs"], 3600);
    assert_eq!(json["collection_cache"]["misses"], 1);
    assert_eq!(json["collection_cache"]["ttl_secs"], 60);
}

#[tokio::test]
async fn test_flush_empties_caches_and_resets_stats() {
    let app = TestApp::new();
    let image = png_payload(150, 9);

    app.scan(&image, "session-a").await;
    app.scan(&image, "session-a").await;

    let response = app.post("/admin/cache/flush").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let stats = app.service.cache_stats();
    assert_eq!(stats.scan_cache.current_size, 0);
    assert_eq!(stats.scan_cache.hits, 0);
    assert_eq!(stats.scan_cache.misses, 0);

    // Flushed photos run again
    assert_eq!(body_json(app.scan(&image, "session-a").await).await["cache_hit"], false);
    assert_eq!(app.analyzer.calls(), 2);
}
