//! Caching subsystem.
//!
//! - [`TtlCache`]: in-memory keyed store of `(value, last_refreshed)`.
//!   Reads treat anything older than the entry's TTL as a miss; a periodic
//!   [`TtlCache::sweep()`] (driven by the [`Scheduler`](crate::scheduler::Scheduler))
//!   drops stale entries so memory stays bounded without reads paying for it.
//!
//! - [`CacheKey`]: deterministic string keys derived from the logical
//!   query. Equal queries normalize to equal keys so the cache and the
//!   [`Coalescer`](crate::coalesce::Coalescer) agree on identity.
//!
//! - [`CacheTtls`]: TTL policy per data category. TTL belongs to the
//!   category (listing snapshot, latest prices, history series, FX), not to
//!   the individual request.

mod key;
mod ttl;

pub use key::{CacheKey, normalize_ids};
pub use ttl::{CacheEntry, TtlCache};

use std::time::Duration;

use crate::types::HistoryRange;

/// TTL policy for each cached data category.
///
/// ```rust
/// # use pricegate::cache::CacheTtls;
/// # use std::time::Duration;
/// let ttls = CacheTtls::new()
///     .latest(Duration::from_secs(60))
///     .snapshot(Duration::from_secs(3600));
/// assert_eq!(ttls.latest, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct CacheTtls {
    /// Top listing snapshot. Default: 2 hours.
    pub snapshot: Duration,
    /// Latest prices. Default: 5 minutes.
    pub latest: Duration,
    /// History series shorter than the maximum range. Default: 24 hours.
    pub history: Duration,
    /// The maximum-range (365 day) canonical series. Default: 48 hours.
    pub history_max_range: Duration,
    /// FX rates. Default: 24 hours.
    pub fx: Duration,
    /// Max age of persisted coin metadata before it is refetched. Default: 7 days.
    pub meta_max_age: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            snapshot: Duration::from_secs(2 * 3600),
            latest: Duration::from_secs(5 * 60),
            history: Duration::from_secs(24 * 3600),
            history_max_range: Duration::from_secs(48 * 3600),
            fx: Duration::from_secs(24 * 3600),
            meta_max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl CacheTtls {
    /// Create a policy with the default TTLs.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(mut self, ttl: Duration) -> Self {
        self.snapshot = ttl;
        self
    }

    pub fn latest(mut self, ttl: Duration) -> Self {
        self.latest = ttl;
        self
    }

    pub fn history(mut self, ttl: Duration) -> Self {
        self.history = ttl;
        self
    }

    pub fn history_max_range(mut self, ttl: Duration) -> Self {
        self.history_max_range = ttl;
        self
    }

    pub fn fx(mut self, ttl: Duration) -> Self {
        self.fx = ttl;
        self
    }

    pub fn meta_max_age(mut self, age: Duration) -> Self {
        self.meta_max_age = age;
        self
    }

    /// TTL for a history series of the given (canonical) range.
    pub fn history_for(&self, range: HistoryRange) -> Duration {
        if range == HistoryRange::Year {
            self.history_max_range
        } else {
            self.history
        }
    }
}
