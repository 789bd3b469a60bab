//! Signed URL authentication for admin and blob routes.
//!
//! Tests verify:
//! - Admin routes require a valid, unexpired signature when auth is enabled
//! - Public routes stay open
//! - Blob downloads are always signature-checked

use axum::http::StatusCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use monster_scanner::{RouterConfig, UrlSigner};

use super::test_utils::{
    blob_uri, body_json, png_payload, TestApp, TestAppOptions, AUTH_SECRET,
};

fn protected_app() -> TestApp {
    TestApp::build(TestAppOptions {
        router_config: RouterConfig::new(AUTH_SECRET),
        ..TestAppOptions::default()
    })
}

fn signed(path: &str) -> String {
    UrlSigner::new(AUTH_SECRET).generate_signed_url("", path, Duration::from_secs(300), &[])
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

// =============================================================================
// Admin Routes
// =============================================================================

#[tokio::test]
async fn test_admin_requires_signature() {
    let app = protected_app();

    let response = app.get("/admin/cache/stats").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "missing_signature");

    let response = app.get("/admin/counters").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.post("/admin/cache/flush").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_with_valid_signature() {
    let app = protected_app();

    let response = app.get(&signed("/admin/cache/stats")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get(&signed("/admin/counters")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.post(&signed("/admin/cache/flush")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_admin_signature_is_path_bound() {
    let app = protected_app();

    // A signature for one admin path does not open another
    let url = signed("/admin/counters").replace("/admin/counters", "/admin/cache/stats");
    let response = app.get(&url).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_signature");
}

#[tokio::test]
async fn test_admin_wrong_secret() {
    let app = protected_app();

    let url = UrlSigner::new("some-other-secret").generate_signed_url(
        "",
        "/admin/cache/stats",
        Duration::from_secs(300),
        &[],
    );
    let response = app.get(&url).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_expired_signature() {
    let app = protected_app();

    let expiry = now() - 10;
    let signature = UrlSigner::new(AUTH_SECRET).sign_with_expiry("/admin/cache/stats", expiry);
    let response = app
        .get(&format!("/admin/cache/stats?exp={}&sig={}", expiry, signature))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "signature_expired");
}

#[tokio::test]
async fn test_admin_malformed_parameters() {
    let app = protected_app();

    let response = app
        .get(&format!("/admin/cache/stats?exp={}&sig=not-hex", now() + 60))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/admin/cache/stats?exp=soon&sig=abcd").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/admin/cache/stats?sig=abcd").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "missing_expiry");
}

#[tokio::test]
async fn test_admin_open_without_auth() {
    let app = TestApp::new();

    let response = app.get("/admin/cache/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_public_routes_stay_open_with_auth() {
    let app = protected_app();

    assert_eq!(app.get("/health").await.status(), StatusCode::OK);
    assert_eq!(
        app.scan(&png_payload(64, 1), "session-a").await.status(),
        StatusCode::OK
    );
    assert_eq!(
        app.get("/sessions/session-a/monsters").await.status(),
        StatusCode::OK
    );
}

// =============================================================================
// Blob Route
// =============================================================================

#[tokio::test]
async fn test_blob_requires_signature() {
    let app = TestApp::new();

    let json = body_json(app.scan(&png_payload(64, 2), "session-a").await).await;
    let url = blob_uri(json["result"]["image"]["url"].as_str().unwrap()).to_string();
    let path = url.split('?').next().unwrap();

    assert_eq!(app.get(&url).await.status(), StatusCode::OK);
    assert_eq!(app.get(path).await.status(), StatusCode::UNAUTHORIZED);

    // The admin secret does not sign blobs
    let forged = UrlSigner::new(AUTH_SECRET).generate_signed_url(
        "",
        path,
        Duration::from_secs(60),
        &[],
    );
    assert_eq!(app.get(&forged).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_blob_that_does_not_exist() {
    let app = TestApp::new();

    let url = app.blobs.signer().generate_signed_url(
        "",
        "/blobs/monsters/session-a/missing.png",
        Duration::from_secs(60),
        &[],
    );
    let response = app.get(&url).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "not_found");
}
