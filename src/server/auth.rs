//! Signed URL authentication.
//!
//! Two things are handed out as signed URLs: local blob downloads
//! (`/blobs/...`, issued by the in-memory blob store) and admin endpoints
//! (`/admin/...`, issued by the `sign` subcommand).
//!
//! # URL Signing Scheme
//!
//! A signature is an HMAC-SHA256 over the path and the canonical query
//! (all parameters except `sig`, sorted by key then value):
//!
//! ```text
//! signature = HMAC-SHA256(secret_key, "{path}?{canonical_query}")
//! ```
//!
//! The query must carry `exp` (Unix seconds). Signatures are compared in
//! constant time.
//!
//! ```text
//! /blobs/monsters/session-1/0b5c...e1.png?exp=1735689600&sig=abc123...
//! ```
//!
//! # Example
//!
//! ```rust
//! use monster_scanner::server::auth::UrlSigner;
//! use std::time::Duration;
//!
//! let signer = UrlSigner::new("my-secret-key");
//!
//! let path = "/admin/cache/stats";
//! let (signature, expiry) = signer.sign(path, Duration::from_secs(3600));
//!
//! assert!(signer.verify(path, &signature, expiry, &[]).is_ok());
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{OriginalUri, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::handlers::ErrorResponse;

// =============================================================================
// Types
// =============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Authentication error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Signature is missing from request
    MissingSignature,

    /// Expiry timestamp is missing from request
    MissingExpiry,

    /// Signature has expired
    Expired { expired_at: u64, current_time: u64 },

    /// Signature does not match
    InvalidSignature,

    /// Signature is not valid hex, or was given twice
    InvalidSignatureFormat,

    /// Expiry is not an integer, or was given twice
    InvalidExpiryFormat,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingSignature => write!(f, "Missing signature parameter"),
            AuthError::MissingExpiry => write!(f, "Missing expiry parameter"),
            AuthError::Expired {
                expired_at,
                current_time,
            } => write!(
                f,
                "Signature expired at {} (current time: {})",
                expired_at, current_time
            ),
            AuthError::InvalidSignature => write!(f, "Invalid signature"),
            AuthError::InvalidSignatureFormat => write!(f, "Invalid signature format"),
            AuthError::InvalidExpiryFormat => write!(f, "Invalid expiry format"),
        }
    }
}

impl std::error::Error for AuthError {}

impl AuthError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::MissingSignature => (StatusCode::UNAUTHORIZED, "missing_signature"),
            AuthError::MissingExpiry => (StatusCode::UNAUTHORIZED, "missing_expiry"),
            AuthError::Expired { .. } => (StatusCode::UNAUTHORIZED, "signature_expired"),
            AuthError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            AuthError::InvalidSignatureFormat => {
                (StatusCode::BAD_REQUEST, "invalid_signature_format")
            }
            AuthError::InvalidExpiryFormat => (StatusCode::BAD_REQUEST, "invalid_expiry_format"),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let message = self.to_string();

        // A wrong signature may be probing; everything else is routine
        if matches!(self, AuthError::InvalidSignature) {
            warn!(
                error_type,
                status = status.as_u16(),
                "Authentication failed: {}",
                message
            );
        } else {
            debug!(
                error_type,
                status = status.as_u16(),
                "Authentication failed: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// UrlSigner
// =============================================================================

/// HMAC-SHA256 URL signer and verifier.
#[derive(Clone)]
pub struct UrlSigner {
    secret_key: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl UrlSigner {
    /// Create a signer. Keys should be at least 32 bytes.
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    /// Sign a path valid for `ttl`. Returns `(hex signature, expiry)`.
    pub fn sign(&self, path: &str, ttl: Duration) -> (String, u64) {
        self.sign_with_params(path, ttl, &[])
    }

    /// Sign a path with extra query parameters.
    ///
    /// `params` should exclude `exp` and `sig`; those are added automatically.
    pub fn sign_with_params(
        &self,
        path: &str,
        ttl: Duration,
        params: &[(&str, &str)],
    ) -> (String, u64) {
        let expiry = unix_now().saturating_add(ttl.as_secs());
        let signature = self.compute_signature(path, expiry, params);
        (signature, expiry)
    }

    /// Sign a path with a fixed expiry timestamp.
    pub fn sign_with_expiry(&self, path: &str, expiry: u64) -> String {
        self.compute_signature(path, expiry, &[])
    }

    /// Verify a signature for a path, expiry and extra parameters.
    pub fn verify(
        &self,
        path: &str,
        signature: &str,
        expiry: u64,
        params: &[(&str, &str)],
    ) -> Result<(), AuthError> {
        let current_time = unix_now();
        if current_time > expiry {
            return Err(AuthError::Expired {
                expired_at: expiry,
                current_time,
            });
        }

        let provided_sig = hex::decode(signature).map_err(|_| AuthError::InvalidSignatureFormat)?;
        let expected_sig = self.compute_mac(path, expiry, params);

        if provided_sig.ct_eq(&expected_sig).into() {
            Ok(())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    fn compute_mac(&self, path: &str, expiry: u64, params: &[(&str, &str)]) -> Vec<u8> {
        let message = signature_base(path, expiry, params);

        let mut mac =
            HmacSha256::new_from_slice(&self.secret_key).expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn compute_signature(&self, path: &str, expiry: u64, params: &[(&str, &str)]) -> String {
        hex::encode(self.compute_mac(path, expiry, params))
    }

    /// Build `{base_url}{path}?{extra}&exp=..&sig=..`.
    pub fn generate_signed_url(
        &self,
        base_url: &str,
        path: &str,
        ttl: Duration,
        extra_params: &[(&str, &str)],
    ) -> String {
        let (signature, expiry) = self.sign_with_params(path, ttl, extra_params);

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in extra_params {
            serializer.append_pair(key, value);
        }
        serializer.append_pair("exp", &expiry.to_string());
        serializer.append_pair("sig", &signature);

        format!(
            "{}{}?{}",
            base_url.trim_end_matches('/'),
            path,
            serializer.finish()
        )
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn signature_base(path: &str, expiry: u64, params: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();
    pairs.push(("exp".to_string(), expiry.to_string()));
    pairs.sort();

    let canonical = pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", path, canonical)
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Reject requests whose `sig`/`exp` do not verify against the request path.
///
/// ```ignore
/// let app = Router::new()
///     .route("/admin/cache/stats", get(cache_stats_handler))
///     .layer(middleware::from_fn_with_state(signer, auth_middleware));
/// ```
pub async fn auth_middleware(
    State(signer): State<UrlSigner>,
    OriginalUri(original_uri): OriginalUri,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let query = original_uri.query().unwrap_or("");
    let mut signature: Option<String> = None;
    let mut expiry: Option<u64> = None;
    let mut extra_params: Vec<(String, String)> = Vec::new();

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "sig" => {
                if signature.is_some() {
                    return Err(AuthError::InvalidSignatureFormat);
                }
                signature = Some(value.into_owned());
            }
            "exp" => {
                if expiry.is_some() {
                    return Err(AuthError::InvalidExpiryFormat);
                }
                let parsed = value
                    .parse::<u64>()
                    .map_err(|_| AuthError::InvalidExpiryFormat)?;
                expiry = Some(parsed);
            }
            _ => extra_params.push((key.into_owned(), value.into_owned())),
        }
    }

    let signature = signature.ok_or(AuthError::MissingSignature)?;
    let expiry = expiry.ok_or(AuthError::MissingExpiry)?;

    let extra_params_ref: Vec<(&str, &str)> = extra_params
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    signer.verify(original_uri.path(), &signature, expiry, &extra_params_ref)?;

    Ok(next.run(request).await)
}

// =============================================================================
// Tests
// =============================================================================
