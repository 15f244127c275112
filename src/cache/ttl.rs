//! Moka-backed TTL cache with per-entry refresh stamps.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use tracing::debug;

use crate::telemetry;

/// A cached value together with the moment it was last refreshed.
///
/// Callers only ever see clones; the live entry stays inside the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub last_refreshed: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Time since the entry was last written.
    pub fn age(&self) -> Duration {
        self.last_refreshed.elapsed()
    }

    /// Whether the entry has outlived its TTL.
    pub fn is_expired(&self) -> bool {
        self.age() > self.ttl
    }
}

/// Hands each entry's own TTL to moka so the timer wheel drops it on time.
struct EntryExpiry;

impl<T> Expiry<String, CacheEntry<T>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry<T>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry<T>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Thread-safe keyed store for one cache category.
///
/// `set` stamps the entry with the current time and overwrites any prior
/// value. `get` treats an entry older than its TTL exactly like a miss; it
/// never returns stale data. Cloning the cache is cheap and yields a handle
/// to the same storage.
#[derive(Clone)]
pub struct TtlCache<T: Clone + Send + Sync + 'static> {
    name: &'static str,
    ttl: Duration,
    entries: Cache<String, CacheEntry<T>>,
    /// Expirations reported by moka and not yet claimed by a sweep.
    expired: Arc<AtomicU64>,
}

impl<T: Clone + Send + Sync + 'static> TtlCache<T> {
    /// Create an empty cache whose entries default to `ttl`.
    ///
    /// `name` labels log lines and metrics (e.g. `"history"`).
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        let expired = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&expired);
        let entries = Cache::builder()
            .name(name)
            .expire_after(EntryExpiry)
            .eviction_listener(move |_key: Arc<String>, _value, cause| {
                if cause == RemovalCause::Expired {
                    counter.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "cache" => name)
                        .increment(1);
                }
            })
            .build();
        Self {
            name,
            ttl,
            entries,
            expired,
        }
    }

    /// Category name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Default TTL applied by [`set()`](Self::set).
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a fresh value. Emits cache hit/miss metrics.
    pub fn get(&self, key: &str) -> Option<T> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Look up a fresh entry, including its refresh stamp.
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => self.name).increment(1);
                Some(entry)
            }
            _ => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "cache" => self.name)
                    .increment(1);
                None
            }
        }
    }

    /// Whether a fresh entry exists, without touching hit/miss metrics.
    pub fn contains_fresh(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Insert (or overwrite) `value` under the default TTL.
    pub fn set(&self, key: impl Into<String>, value: T) {
        self.set_with_ttl(key, value, self.ttl);
    }

    /// Insert (or overwrite) `value` with an explicit TTL.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let entry = CacheEntry {
            value,
            last_refreshed: Instant::now(),
            ttl,
        };
        self.entries.insert(key.into(), entry);
    }

    /// Remove a single entry.
    pub fn invalidate(&self, key: &str) {
        self.entries.invalidate(key);
    }

    /// Drop every entry older than its TTL.
    ///
    /// Moka's timer wheel has roughly one-second resolution, so an entry is
    /// reclaimed by the first sweep that runs about a second after it
    /// expired. Reads never see it in the meantime. Returns the number of
    /// expirations since the previous sweep.
    pub fn sweep(&self) -> u64 {
        self.entries.run_pending_tasks();
        let removed = self.expired.swap(0, Ordering::Relaxed);
        if removed > 0 {
            debug!(
                cache = self.name,
                removed,
                remaining = self.entries.entry_count(),
                "swept stale entries"
            );
        }
        removed
    }

    /// Number of entries currently held (including not-yet-swept stale ones).
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
