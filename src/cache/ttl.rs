//! Bounded key/value cache with per-instance TTL.
//!
//! # Eviction
//!
//! Every entry of an instance shares the same TTL, so insertion order and
//! expiry order coincide. Entries are kept in insertion order (a `set` on an
//! existing key moves it to the newest position, a `get` never reorders), and
//! when a new key arrives at capacity:
//!
//! 1. expired entries are purged from the oldest end, then
//! 2. the oldest live entry (the one nearest to expiry) is evicted.
//!
//! # Expiry
//!
//! Expiry is lazy: an expired entry reads as absent and is purged by the
//! lookup that observes it, or by a later insert that needs room.
//!
//! # Counters
//!
//! `hits`, `misses`, `evictions` and `expirations` are monotonic from process
//! start until the next [`TtlCache::flush_all`], which resets them.
//!
//! # Read-through fills
//!
//! A caller that loads a value from a slower source takes a
//! [`TtlCache::generation`] before the load and stores the result with
//! [`TtlCache::set_if_generation`]. Any `invalidate` or `flush_all` in between
//! bumps the generation and the stale fill is dropped.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Inner<V> {
    entries: LruCache<String, Entry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    generation: u64,
}

/// Snapshot of a cache's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Live (non-expired) entries at snapshot time
    pub current_size: usize,
    pub evictions: u64,
    pub expirations: u64,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

/// Bounded TTL cache shared across request handlers.
///
/// Operations are synchronous and never held across an `.await`; the internal
/// mutex is only for the multi-threaded runtime.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use monster_scanner::cache::TtlCache;
///
/// let cache = TtlCache::new("example", 2, Duration::from_secs(60));
/// cache.set("a".to_string(), 1u32);
/// assert_eq!(cache.get("a"), Some(1));
/// assert_eq!(cache.get("b"), None);
/// ```
pub struct TtlCache<V> {
    name: &'static str,
    max_entries: NonZeroUsize,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache holding at most `max_entries` live entries for `ttl` each.
    ///
    /// A `max_entries` of zero is treated as one; configuration validation
    /// rejects zero before it gets here.
    pub fn new(name: &'static str, max_entries: usize, ttl: Duration) -> Self {
        Self {
            name,
            max_entries: NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN),
            ttl,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
                generation: 0,
            }),
        }
    }

    /// Look up a live entry.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let lookup = inner.entries.peek(key).map(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        });

        match lookup {
            Some(Some(value)) => {
                inner.hits += 1;
                return Some(value);
            }
            Some(None) => {
                inner.entries.pop(key);
                inner.expirations += 1;
                trace!(cache = self.name, key, "expired entry purged on read");
            }
            None => {}
        }

        inner.misses += 1;
        None
    }

    /// Insert or overwrite an entry, restarting its TTL.
    pub fn set(&self, key: String, value: V) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        self.insert(&mut inner, key, value, now);
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Insert only if nothing was invalidated since `generation` was taken.
    ///
    /// Returns whether the value was stored.
    pub fn set_if_generation(&self, key: String, value: V, generation: u64) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            trace!(cache = self.name, key = %key, "stale fill dropped");
            return false;
        }
        self.insert(&mut inner, key, value, now);
        true
    }

    fn insert(&self, inner: &mut Inner<V>, key: String, value: V, now: Instant) {
        let entry = Entry {
            value,
            inserted_at: now,
            expires_at: now + self.ttl,
        };

        if inner.entries.contains(&key) {
            inner.entries.put(key, entry);
            return;
        }

        // Oldest-first order is expiry order, so expired entries sit at the tail.
        while inner
            .entries
            .peek_lru()
            .is_some_and(|(_, oldest)| oldest.is_expired(now))
        {
            inner.entries.pop_lru();
            inner.expirations += 1;
        }

        while inner.entries.len() >= self.max_entries.get() {
            if let Some((evicted, entry)) = inner.entries.pop_lru() {
                inner.evictions += 1;
                debug!(
                    cache = self.name,
                    key = %evicted,
                    age_ms = now.saturating_duration_since(entry.inserted_at).as_millis() as u64,
                    "evicted entry at capacity"
                );
            } else {
                break;
            }
        }

        inner.entries.put(key, entry);
    }

    /// Remove an entry if present.
    pub fn invalidate(&self, key: &str) {
        let mut inner = self.inner.lock();
        inner.generation = inner.generation.wrapping_add(1);
        if inner.entries.pop(key).is_some() {
            trace!(cache = self.name, key, "entry invalidated");
        }
    }

    /// Remove every entry and reset the counters.
    pub fn flush_all(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.entries.clear();
        inner.generation = inner.generation.wrapping_add(1);
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
        inner.expirations = 0;
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let current_size = self.len();
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            current_size,
            evictions: inner.evictions,
            expirations: inner.expirations,
            max_entries: self.max_entries.get(),
            ttl_secs: self.ttl.as_secs(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.max_entries.get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
