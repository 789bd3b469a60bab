//! In-process caching primitives.
//!
//! - [`TtlCache`]: bounded key/value store with time-based expiry, used for
//!   both the scan-dedup cache and the collection-read cache
//! - [`Fingerprinter`]: cheap content hash that keys the scan-dedup cache
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use monster_scanner::cache::{fingerprint, TtlCache};
//!
//! let scans: TtlCache<String> = TtlCache::new("scan", 100, Duration::from_secs(3600));
//!
//! let key = fingerprint(b"raw image bytes");
//! if scans.get(&key).is_none() {
//!     scans.set(key.clone(), "expensive result".to_string());
//! }
//! assert_eq!(scans.stats().misses, 1);
//! ```

mod fingerprint;
mod ttl;

pub use fingerprint::{
    fingerprint, FingerprintMode, Fingerprinter, DEFAULT_SAMPLE_WIDTH, DEFAULT_SAMPLE_WINDOWS,
};
pub use ttl::{CacheStats, TtlCache};
