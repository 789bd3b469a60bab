//! End-to-end scan tests.
//!
//! Tests verify:
//! - A full pipeline run and the record it produces
//! - Deduplication of identical photos, sequential and concurrent
//! - Request validation and the 10 MiB size boundary
//! - Degradation when narration or blob storage fail
//! - Collaborator failures and missing collaborators

use axum::http::{Request, StatusCode};
use std::time::Duration;
use tokio::task::JoinSet;

use monster_scanner::pipeline::{PipelineSettings, DEFAULT_MAX_IMAGE_BYTES};

use super::test_utils::{
    blob_uri, body_bytes, body_json, fast_settings, header_str, png_payload, MockAnalyzer,
    MockSpeech, TestApp, TestAppOptions, UnavailableBlobStore,
};

// =============================================================================
// Successful Scans
// =============================================================================

#[tokio::test]
async fn test_scan_produces_complete_record() {
    let app = TestApp::new();

    let response = app.scan(&png_payload(256, 1), "session-a").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-scan-cache-hit"), Some("false"));

    let json = body_json(response).await;
    assert_eq!(json["cache_hit"], false);

    let record = &json["result"];
    assert_eq!(record["session_id"], "session-a");
    assert_eq!(record["attributes"]["name"], "Lampyre");
    assert_eq!(record["attributes"]["tags"][1], "metal");
    assert_eq!(record["image"]["kind"], "url");
    assert!(record["source_image_url"].is_string());
    assert!(record["audio_url"].is_string());

    let metrics = &record["metrics"];
    assert_eq!(metrics["fingerprint"].as_str().unwrap().len(), 16);
    assert_eq!(metrics["model_identifiers"]["analyzer"], "mock-vision-1");
    assert_eq!(metrics["model_identifiers"]["synthesizer"], "mock-painter-2");
    assert!(metrics["stage_latencies_ms"]["analyzing"].is_u64());

    assert_eq!(app.analyzer.calls(), 1);
    assert_eq!(app.synthesizer.calls(), 1);
    assert_eq!(app.speech.calls(), 1);
}

#[tokio::test]
async fn test_generated_image_is_downloadable() {
    let app = TestApp::new();

    let json = body_json(app.scan(&png_payload(64, 2), "session-a").await).await;
    let url = json["result"]["image"]["url"].as_str().unwrap();

    let response = app.get(blob_uri(url)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), Some("image/png"));
    assert_eq!(body_bytes(response).await.as_ref(), png_payload(16, 0xAB));
}

#[tokio::test]
async fn test_accepts_data_uri_payload() {
    let app = TestApp::new();
    let image = png_payload(32, 3);
    let body = serde_json::json!({
        "image": format!(
            "data:image/png;base64,{}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &image)
        ),
        "session_id": "session-a",
    });

    let request = Request::builder()
        .method("POST")
        .uri("/scan")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Deduplication
// =============================================================================

#[tokio::test]
async fn test_identical_photo_is_served_from_cache() {
    let app = TestApp::new();
    let image = png_payload(512, 4);

    let first = body_json(app.scan(&image, "session-a").await).await;

    let response = app.scan(&image, "session-a").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-scan-cache-hit"), Some("true"));
    let second = body_json(response).await;

    assert_eq!(second["cache_hit"], true);
    assert_eq!(second["result"], first["result"]);
    assert_eq!(app.analyzer.calls(), 1);
    assert_eq!(app.synthesizer.calls(), 1);

    let stats = app.service.cache_stats();
    assert_eq!(stats.scan_cache.hits, 1);
    assert_eq!(stats.scan_cache.misses, 1);
}

#[tokio::test]
async fn test_different_photos_run_separately() {
    let app = TestApp::new();

    app.scan(&png_payload(512, 5), "session-a").await;
    app.scan(&png_payload(512, 6), "session-a").await;

    assert_eq!(app.analyzer.calls(), 2);
    assert_eq!(app.service.cache_stats().scan_cache.current_size, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_scans_share_one_run() {
    let app = TestApp::build(TestAppOptions {
        analyzer: Some(MockAnalyzer::new().with_delay(Duration::from_millis(100))),
        ..TestAppOptions::default()
    });
    let image = png_payload(1024, 7);

    let mut tasks = JoinSet::new();
    for _ in 0..5 {
        let router = app.router.clone();
        let image = image.clone();
        tasks.spawn(async move {
            use tower::ServiceExt;
            let request = Request::builder()
                .method("POST")
                .uri("/scan")
                .header("content-type", "application/json")
                .body(super::test_utils::scan_body(&image, "session-a"))
                .unwrap();
            let response = router.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            body_json(response).await
        });
    }

    let mut ids = Vec::new();
    let mut misses = 0;
    while let Some(result) = tasks.join_next().await {
        let json = result.unwrap();
        if json["cache_hit"] == false {
            misses += 1;
        }
        ids.push(json["result"]["id"].as_str().unwrap().to_string());
    }

    assert_eq!(app.analyzer.calls(), 1);
    assert_eq!(app.synthesizer.calls(), 1);
    assert_eq!(misses, 1);
    assert!(ids.iter().all(|id| id == &ids[0]));
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_image_at_limit_is_accepted() {
    let app = TestApp::new();

    let response = app
        .scan(&png_payload(DEFAULT_MAX_IMAGE_BYTES, 8), "session-a")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_image_over_limit_is_rejected() {
    let app = TestApp::new();

    let response = app
        .scan(&png_payload(DEFAULT_MAX_IMAGE_BYTES + 1, 8), "session-a")
        .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let json = body_json(response).await;
    assert_eq!(json["error"], "payload_too_large");
    assert_eq!(json["status"], 413);
    assert_eq!(app.analyzer.calls(), 0);
}

#[tokio::test]
async fn test_smaller_configured_limit() {
    let app = TestApp::build(TestAppOptions {
        settings: PipelineSettings {
            max_image_bytes: 100,
            ..fast_settings()
        },
        ..TestAppOptions::default()
    });

    assert_eq!(app.scan(&png_payload(100, 9), "s").await.status(), StatusCode::OK);
    assert_eq!(
        app.scan(&png_payload(101, 9), "s").await.status(),
        StatusCode::PAYLOAD_TOO_LARGE
    );
}

#[tokio::test]
async fn test_body_far_above_limit_is_rejected_before_parsing() {
    let app = TestApp::build(TestAppOptions {
        settings: PipelineSettings {
            max_image_bytes: 100,
            ..fast_settings()
        },
        ..TestAppOptions::default()
    });

    let response = app.scan(&png_payload(200_000, 9), "s").await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.analyzer.calls(), 0);
}

#[tokio::test]
async fn test_missing_fields_are_bad_requests() {
    let app = TestApp::new();

    for body in [
        serde_json::json!({ "session_id": "s" }),
        serde_json::json!({ "image": "", "session_id": "s" }),
        serde_json::json!({ "image": "not base64!!", "session_id": "s" }),
        serde_json::json!({ "image": "iVBORw0KGgo=" }),
        serde_json::json!({ "image": "iVBORw0KGgo=", "session_id": "" }),
        serde_json::json!({ "image": "iVBORw0KGgo=", "session_id": "has spaces" }),
        serde_json::json!({ "image": 42, "session_id": "s" }),
    ] {
        let request = Request::builder()
            .method("POST")
            .uri("/scan")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(body_json(response).await["error"], "invalid_request");
    }

    assert_eq!(app.analyzer.calls(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = TestApp::new();

    let request = Request::builder()
        .method("POST")
        .uri("/scan")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

// =============================================================================
// Degradation and Failures
// =============================================================================

#[tokio::test]
async fn test_narration_failure_still_completes() {
    let app = TestApp::build(TestAppOptions {
        speech: MockSpeech::failing(),
        ..TestAppOptions::default()
    });

    let response = app.scan(&png_payload(128, 10), "session-a").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json["result"].get("audio_url").is_none());
    assert_eq!(json["result"]["image"]["kind"], "url");
    assert!(app.speech.calls() >= 1);
}

#[tokio::test]
async fn test_blob_store_outage_embeds_image() {
    let outage = UnavailableBlobStore::default();
    let app = TestApp::build(TestAppOptions {
        unavailable_blobs: Some(outage.clone()),
        ..TestAppOptions::default()
    });

    let response = app.scan(&png_payload(128, 11), "session-a").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let image = &json["result"]["image"];
    assert_eq!(image["kind"], "embedded");
    assert!(image["data_uri"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
    assert!(json["result"].get("source_image_url").is_none());
    assert!(json["result"].get("audio_url").is_none());
    assert!(outage.uploads() > 0);

    // Embedded records are still cached and listed
    let collection = body_json(app.get("/sessions/session-a/monsters").await).await;
    assert_eq!(collection["records"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_analyzer_failure_after_retries() {
    let analyzer = MockAnalyzer::failing();
    let app = TestApp::build(TestAppOptions {
        analyzer: Some(analyzer.clone()),
        ..TestAppOptions::default()
    });

    let response = app.scan(&png_payload(128, 12), "session-a").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(json["error"], "upstream_error");
    assert!(json["message"].as_str().unwrap().contains("overloaded"));
    assert_eq!(analyzer.calls(), 3);
    assert_eq!(app.synthesizer.calls(), 0);

    // Failures are not cached
    assert_eq!(app.service.cache_stats().scan_cache.current_size, 0);
    let collection = body_json(app.get("/sessions/session-a/monsters").await).await;
    assert!(collection["records"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_redacted_upstream_error() {
    let app = TestApp::build(TestAppOptions {
        analyzer: Some(MockAnalyzer::failing()),
        router_config: monster_scanner::RouterConfig::without_auth().with_redacted_errors(true),
        ..TestAppOptions::default()
    });

    let json = body_json(app.scan(&png_payload(128, 13), "session-a").await).await;
    assert_eq!(json["error"], "upstream_error");
    assert!(!json["message"].as_str().unwrap().contains("overloaded"));
}

#[tokio::test]
async fn test_missing_analyzer_is_service_unavailable() {
    let app = TestApp::build(TestAppOptions {
        analyzer: None,
        ..TestAppOptions::default()
    });

    let response = app.scan(&png_payload(128, 14), "session-a").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = body_json(response).await;
    assert_eq!(json["error"], "service_unavailable");
    assert!(json["message"].as_str().unwrap().contains("image analyzer"));
    assert_eq!(app.synthesizer.calls(), 0);
}

#[tokio::test]
async fn test_validation_precedes_missing_collaborator() {
    let app = TestApp::build(TestAppOptions {
        analyzer: None,
        ..TestAppOptions::default()
    });

    let response = app
        .scan(&png_payload(DEFAULT_MAX_IMAGE_BYTES + 1, 1), "session-a")
        .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
