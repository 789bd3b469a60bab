//! Retry with exponential backoff around fallible async operations.
//!
//! Total attempts are `1 + max_retries`. Before retry `i` (0-based) the
//! wrapper sleeps `initial_delay * 2^i`; no jitter is applied. When attempts
//! run out the last error is returned unchanged.
//!
//! The wrapped operation may run more than once, so it must be idempotent.
//! Adding jitter is the obvious hardening step once many clients share an
//! upstream.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{StorageError, UpstreamError};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Exponent cap so the delay arithmetic cannot overflow.
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Errors that can declare themselves not worth retrying.
pub trait Retryable {
    fn is_retryable(&self) -> bool {
        true
    }
}

impl Retryable for UpstreamError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        !matches!(self, StorageError::InvalidPath(_))
    }
}

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every following retry
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay slept before retry number `retry_index` (0-based).
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(retry_index.min(MAX_BACKOFF_EXPONENT));
        self.initial_delay.saturating_mul(multiplier)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_INITIAL_DELAY)
    }
}

/// Run `operation`, retrying failures per `policy`.
///
/// Every failed attempt is logged. Errors whose [`Retryable::is_retryable`]
/// returns `false` are returned immediately.
pub async fn retry_with_backoff<T, E, F, Fut>(
    op: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut retry_index = 0u32;

    loop {
        let attempt = retry_index + 1;
        match operation().await {
            Ok(value) => {
                if retry_index > 0 {
                    debug!(op, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => {
                warn!(op, attempt, error = %err, "permanent failure, not retrying");
                return Err(err);
            }
            Err(err) if retry_index >= policy.max_retries => {
                warn!(op, attempt, error = %err, "attempts exhausted");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for(retry_index);
                warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                retry_index += 1;
            }
        }
    }
}
