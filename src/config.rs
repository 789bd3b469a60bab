//! Configuration management for the monster scanner.
//!
//! Every option can be given on the command line or through an environment
//! variable with the `MONSTER_` prefix:
//!
//! - `MONSTER_HOST` / `MONSTER_PORT` - Bind address (default: 0.0.0.0:3000)
//! - `MONSTER_PUBLIC_BASE_URL` - Base of URLs handed to clients for local blobs
//! - `MONSTER_S3_BUCKET` - S3 bucket for assets (unset: in-memory blob store)
//! - `MONSTER_S3_ENDPOINT` / `MONSTER_S3_REGION` / `MONSTER_S3_PREFIX`
//! - `MONSTER_ANALYZER_URL` / `_MODEL` / `_API_KEY` - Image analysis endpoint
//! - `MONSTER_SYNTHESIZER_URL` / `_MODEL` / `_API_KEY` - Image synthesis endpoint
//! - `MONSTER_SPEECH_URL` / `_MODEL` / `_API_KEY` - Optional narration endpoint
//! - `MONSTER_MAX_IMAGE_BYTES` - Largest accepted photo (default: 10 MiB)
//! - `MONSTER_SCAN_CACHE_ENTRIES` / `MONSTER_SCAN_CACHE_TTL`
//! - `MONSTER_COLLECTION_CACHE_ENTRIES` / `MONSTER_COLLECTION_CACHE_TTL`
//! - `MONSTER_RETRY_ATTEMPTS` / `MONSTER_RETRY_INITIAL_DELAY_MS`
//! - `MONSTER_FINGERPRINT_MODE` - `full` or `sampled`
//! - `MONSTER_AUTH_SECRET` / `MONSTER_AUTH_ENABLED` - Signed admin URLs
//! - `MONSTER_REDACT_ERRORS` - Hide upstream causes from error responses
//!
//! ```ignore
//! use clap::Parser;
//! use monster_scanner::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Serve(config) => println!("listening on {}", config.bind_address()),
//!     _ => {}
//! }
//! ```

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use url::Url;

use crate::cache::{FingerprintMode, Fingerprinter, DEFAULT_SAMPLE_WIDTH, DEFAULT_SAMPLE_WINDOWS};
use crate::pipeline::{
    PipelineSettings, RetryPolicy, DEFAULT_COLLECTION_CACHE_ENTRIES, DEFAULT_MAX_IMAGE_BYTES,
    DEFAULT_SCAN_CACHE_ENTRIES,
};

// =============================================================================
// Default Values
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default scan cache TTL in seconds (1 hour).
pub const DEFAULT_SCAN_CACHE_TTL_SECS: u64 = 3600;

/// Default collection cache TTL in seconds.
pub const DEFAULT_COLLECTION_CACHE_TTL_SECS: u64 = 60;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 500;

pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SYNTHESIS_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SPEECH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 15;

/// Default signed asset URL lifetime in seconds (24 hours).
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 86_400;

/// Longest lifetime S3 accepts for a presigned URL (7 days).
pub const MAX_PRESIGNED_TTL_SECS: u64 = 7 * 24 * 3600;

pub const DEFAULT_ANALYZER_MODEL: &str = "vision-default";
pub const DEFAULT_SYNTHESIZER_MODEL: &str = "image-default";
pub const DEFAULT_SPEECH_MODEL: &str = "tts-default";

/// Default TTL for the `sign` subcommand, in seconds.
pub const DEFAULT_SIGN_TTL: u64 = 3600;

// =============================================================================
// CLI
// =============================================================================

/// Monster scanner - turns photos into generated monsters.
#[derive(Parser, Debug, Clone)]
#[command(name = "monster-scanner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeConfig),

    /// Sign an admin path for the signed URL middleware (admin auth is off by default)
    Sign(SignConfig),

    /// Validate configuration and test storage connectivity
    Check(CheckConfig),
}

/// Fingerprint mode as accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintModeArg {
    /// Hash every byte
    #[default]
    Full,

    /// Hash evenly spaced windows
    Sampled,
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "MONSTER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "MONSTER_PORT")]
    pub port: u16,

    /// Externally reachable base URL, used for locally served blob URLs.
    ///
    /// Defaults to `http://{host}:{port}`.
    #[arg(long, env = "MONSTER_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    // =========================================================================
    // Storage
    // =========================================================================
    /// S3 bucket for photos, generated images and audio.
    ///
    /// Without a bucket, assets are kept in memory and served by this process.
    /// That store is for development only: it is never pruned, so memory grows
    /// with every scan until restart.
    #[arg(long, env = "MONSTER_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "MONSTER_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[arg(long, default_value = DEFAULT_REGION, env = "MONSTER_S3_REGION")]
    pub s3_region: String,

    /// Key prefix for every stored object.
    #[arg(long, default_value = "", env = "MONSTER_S3_PREFIX")]
    pub s3_prefix: String,

    /// Lifetime of signed asset URLs, in seconds.
    #[arg(long, default_value_t = DEFAULT_SIGNED_URL_TTL_SECS, env = "MONSTER_SIGNED_URL_TTL")]
    pub signed_url_ttl: u64,

    // =========================================================================
    // AI collaborators
    // =========================================================================
    /// Image analysis endpoint. Scans fail with 503 when unset.
    #[arg(long, env = "MONSTER_ANALYZER_URL")]
    pub analyzer_url: Option<String>,

    #[arg(long, default_value = DEFAULT_ANALYZER_MODEL, env = "MONSTER_ANALYZER_MODEL")]
    pub analyzer_model: String,

    #[arg(long, env = "MONSTER_ANALYZER_API_KEY", hide_env_values = true)]
    pub analyzer_api_key: Option<String>,

    /// Image synthesis endpoint. Scans fail with 503 when unset.
    #[arg(long, env = "MONSTER_SYNTHESIZER_URL")]
    pub synthesizer_url: Option<String>,

    #[arg(long, default_value = DEFAULT_SYNTHESIZER_MODEL, env = "MONSTER_SYNTHESIZER_MODEL")]
    pub synthesizer_model: String,

    #[arg(long, env = "MONSTER_SYNTHESIZER_API_KEY", hide_env_values = true)]
    pub synthesizer_api_key: Option<String>,

    /// Text-to-speech endpoint. Narration is skipped when unset.
    #[arg(long, env = "MONSTER_SPEECH_URL")]
    pub speech_url: Option<String>,

    #[arg(long, default_value = DEFAULT_SPEECH_MODEL, env = "MONSTER_SPEECH_MODEL")]
    pub speech_model: String,

    #[arg(long, env = "MONSTER_SPEECH_API_KEY", hide_env_values = true)]
    pub speech_api_key: Option<String>,

    // =========================================================================
    // Pipeline
    // =========================================================================
    /// Largest accepted image, in decoded bytes (inclusive).
    #[arg(long, default_value_t = DEFAULT_MAX_IMAGE_BYTES, env = "MONSTER_MAX_IMAGE_BYTES")]
    pub max_image_bytes: usize,

    /// Retries after the first attempt for each collaborator call.
    #[arg(long, default_value_t = DEFAULT_RETRY_ATTEMPTS, env = "MONSTER_RETRY_ATTEMPTS")]
    pub retry_attempts: u32,

    /// Delay before the first retry; doubles on each following retry.
    #[arg(long, default_value_t = DEFAULT_RETRY_INITIAL_DELAY_MS, env = "MONSTER_RETRY_INITIAL_DELAY_MS")]
    pub retry_initial_delay_ms: u64,

    /// Per-attempt analysis budget, in seconds.
    #[arg(long, default_value_t = DEFAULT_ANALYSIS_TIMEOUT_SECS, env = "MONSTER_ANALYSIS_TIMEOUT")]
    pub analysis_timeout: u64,

    #[arg(long, default_value_t = DEFAULT_SYNTHESIS_TIMEOUT_SECS, env = "MONSTER_SYNTHESIS_TIMEOUT")]
    pub synthesis_timeout: u64,

    #[arg(long, default_value_t = DEFAULT_SPEECH_TIMEOUT_SECS, env = "MONSTER_SPEECH_TIMEOUT")]
    pub speech_timeout: u64,

    #[arg(long, default_value_t = DEFAULT_STORAGE_TIMEOUT_SECS, env = "MONSTER_STORAGE_TIMEOUT")]
    pub storage_timeout: u64,

    // =========================================================================
    // Caches
    // =========================================================================
    #[arg(long, default_value_t = DEFAULT_SCAN_CACHE_ENTRIES, env = "MONSTER_SCAN_CACHE_ENTRIES")]
    pub scan_cache_entries: usize,

    /// Scan cache TTL, in seconds.
    #[arg(long, default_value_t = DEFAULT_SCAN_CACHE_TTL_SECS, env = "MONSTER_SCAN_CACHE_TTL")]
    pub scan_cache_ttl: u64,

    #[arg(long, default_value_t = DEFAULT_COLLECTION_CACHE_ENTRIES, env = "MONSTER_COLLECTION_CACHE_ENTRIES")]
    pub collection_cache_entries: usize,

    /// Collection cache TTL, in seconds.
    #[arg(long, default_value_t = DEFAULT_COLLECTION_CACHE_TTL_SECS, env = "MONSTER_COLLECTION_CACHE_TTL")]
    pub collection_cache_ttl: u64,

    /// How much of each image the dedup fingerprint covers.
    #[arg(long, value_enum, default_value_t = FingerprintModeArg::Full, env = "MONSTER_FINGERPRINT_MODE")]
    pub fingerprint_mode: FingerprintModeArg,

    /// Windows hashed in sampled mode.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_WINDOWS, env = "MONSTER_SAMPLE_WINDOWS")]
    pub sample_windows: usize,

    /// Bytes per window in sampled mode.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_WIDTH, env = "MONSTER_SAMPLE_WIDTH")]
    pub sample_width: usize,

    // =========================================================================
    // Authentication
    // =========================================================================
    /// Secret key for HMAC-SHA256 signed URLs.
    ///
    /// Required when auth is enabled. Also signs local blob URLs.
    #[arg(long, env = "MONSTER_AUTH_SECRET", hide_env_values = true)]
    pub auth_secret: Option<String>,

    /// Require signed URLs on admin endpoints. Off by default.
    ///
    /// Scan and collection routes are never authenticated; blob downloads are
    /// always signature-checked regardless of this flag.
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set, env = "MONSTER_AUTH_ENABLED")]
    pub auth_enabled: bool,

    // =========================================================================
    // HTTP
    // =========================================================================
    /// Allowed CORS origins (comma-separated). Any origin when unset.
    #[arg(long, env = "MONSTER_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Replace upstream error causes in responses with a generic message.
    #[arg(long, default_value_t = false, env = "MONSTER_REDACT_ERRORS")]
    pub redact_errors: bool,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_enabled && self.auth_secret.as_deref().unwrap_or("").is_empty() {
            return Err(
                "Admin authentication is enabled but no secret provided. \
                 Set --auth-secret or MONSTER_AUTH_SECRET"
                    .to_string(),
            );
        }

        if let Some(bucket) = &self.s3_bucket {
            if bucket.is_empty() {
                return Err("S3 bucket name must not be empty".to_string());
            }
            if self.signed_url_ttl > MAX_PRESIGNED_TTL_SECS {
                return Err(format!(
                    "signed_url_ttl must be at most {} seconds with S3 storage",
                    MAX_PRESIGNED_TTL_SECS
                ));
            }
        }
        if self.signed_url_ttl == 0 {
            return Err("signed_url_ttl must be greater than 0".to_string());
        }

        for (name, value) in [
            ("analyzer_url", &self.analyzer_url),
            ("synthesizer_url", &self.synthesizer_url),
            ("speech_url", &self.speech_url),
            ("public_base_url", &self.public_base_url),
        ] {
            if let Some(value) = value {
                validate_http_url(name, value)?;
            }
        }

        if self.max_image_bytes == 0 {
            return Err("max_image_bytes must be greater than 0".to_string());
        }

        if self.scan_cache_entries == 0 {
            return Err("scan_cache_entries must be greater than 0".to_string());
        }
        if self.collection_cache_entries == 0 {
            return Err("collection_cache_entries must be greater than 0".to_string());
        }
        if self.scan_cache_ttl == 0 || self.collection_cache_ttl == 0 {
            return Err("cache TTLs must be greater than 0".to_string());
        }

        if self.fingerprint_mode == FingerprintModeArg::Sampled
            && (self.sample_windows == 0 || self.sample_width == 0)
        {
            return Err("sample_windows and sample_width must be greater than 0".to_string());
        }
        if self.fingerprint_mode == FingerprintModeArg::Sampled
            && self
                .sample_windows
                .checked_mul(self.sample_width)
                .map_or(true, |sampled| sampled > self.max_image_bytes)
        {
            return Err(
                "sample_windows * sample_width must not exceed max_image_bytes".to_string(),
            );
        }

        if [
            self.analysis_timeout,
            self.synthesis_timeout,
            self.speech_timeout,
            self.storage_timeout,
        ]
        .contains(&0)
        {
            return Err("timeouts must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn auth_secret_or_empty(&self) -> &str {
        self.auth_secret.as_deref().unwrap_or("")
    }

    /// Base URL for locally served blobs.
    pub fn public_base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = if self.host == "0.0.0.0" {
                    "127.0.0.1"
                } else {
                    self.host.as_str()
                };
                format!("http://{}:{}", host, self.port)
            }
        }
    }

    pub fn fingerprinter(&self) -> Fingerprinter {
        let mode = match self.fingerprint_mode {
            FingerprintModeArg::Full => FingerprintMode::Full,
            FingerprintModeArg::Sampled => FingerprintMode::Sampled {
                windows: self.sample_windows,
                width: self.sample_width,
            },
        };
        Fingerprinter::new(mode)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_image_bytes: self.max_image_bytes,
            retry: RetryPolicy::new(
                self.retry_attempts,
                Duration::from_millis(self.retry_initial_delay_ms),
            ),
            analysis_timeout: Duration::from_secs(self.analysis_timeout),
            synthesis_timeout: Duration::from_secs(self.synthesis_timeout),
            speech_timeout: Duration::from_secs(self.speech_timeout),
            storage_timeout: Duration::from_secs(self.storage_timeout),
            signed_url_ttl: Duration::from_secs(self.signed_url_ttl),
        }
    }

    pub fn scan_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.scan_cache_ttl)
    }

    pub fn collection_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.collection_cache_ttl)
    }
}

fn validate_http_url(name: &str, value: &str) -> Result<(), String> {
    let url = Url::parse(value).map_err(|e| format!("{} is not a valid URL: {}", name, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("{} must use http or https, got '{}'", name, other)),
    }
}

// =============================================================================
// Sign
// =============================================================================

/// Output format of the `sign` subcommand.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignOutputFormat {
    /// Path (or full URL with --base-url) including `exp` and `sig`
    #[default]
    Url,

    /// Hex signature only
    Signature,

    /// JSON document with signature, expiry and URL
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct SignConfig {
    /// Path to sign, e.g. `/admin/cache/stats`.
    ///
    /// Only useful against a server started with `--auth-enabled true`; admin
    /// routes are open by default.
    #[arg(long)]
    pub path: String,

    /// HMAC secret; must match the server's.
    #[arg(long, env = "MONSTER_AUTH_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Signature lifetime in seconds.
    #[arg(long, default_value_t = DEFAULT_SIGN_TTL)]
    pub ttl: u64,

    /// Server base URL, to print a complete URL.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Extra query parameters as `key=value`.
    #[arg(long = "param")]
    pub params: Vec<String>,

    #[arg(long, value_enum, default_value_t = SignOutputFormat::Url)]
    pub format: SignOutputFormat,
}

impl SignConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.path.starts_with('/') {
            return Err("path must start with '/'".to_string());
        }
        if self.secret.is_empty() {
            return Err("secret must not be empty".to_string());
        }
        if self.ttl == 0 {
            return Err("ttl must be greater than 0".to_string());
        }
        if let Some(base_url) = &self.base_url {
            validate_http_url("base_url", base_url)?;
        }
        Ok(())
    }

    /// Parse `key=value` parameters, rejecting the reserved `exp` and `sig`.
    pub fn parse_params(&self) -> Result<Vec<(String, String)>, String> {
        self.params
            .iter()
            .map(|param| {
                let (key, value) = param
                    .split_once('=')
                    .ok_or_else(|| format!("parameter '{}' is not key=value", param))?;
                if key.is_empty() {
                    return Err(format!("parameter '{}' has an empty key", param));
                }
                if key == "exp" || key == "sig" {
                    return Err(format!("parameter '{}' is reserved", key));
                }
                Ok((key.to_string(), value.to_string()))
            })
            .collect()
    }
}

// =============================================================================
// Check
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[arg(long, env = "MONSTER_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    #[arg(long, env = "MONSTER_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[arg(long, default_value = DEFAULT_REGION, env = "MONSTER_S3_REGION")]
    pub s3_region: String,

    #[arg(long, env = "MONSTER_ANALYZER_URL")]
    pub analyzer_url: Option<String>,

    #[arg(long, env = "MONSTER_SYNTHESIZER_URL")]
    pub synthesizer_url: Option<String>,

    #[arg(long, env = "MONSTER_SPEECH_URL")]
    pub speech_url: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CheckConfig {
    /// Collaborator endpoints as `(name, url, required)`.
    pub fn collaborators(&self) -> [(&'static str, Option<&str>, bool); 3] {
        [
            ("analyzer", self.analyzer_url.as_deref(), true),
            ("synthesizer", self.synthesizer_url.as_deref(), true),
            ("speech", self.speech_url.as_deref(), false),
        ]
    }

    pub fn validate_url(name: &str, value: &str) -> Result<(), String> {
        validate_http_url(name, value)
    }
}

// =============================================================================
// Tests
// =============================================================================
