//! Telemetry metric name constants.
//!
//! Centralised metric names for pricegate operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `pricegate_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `cache`: cache category (e.g. "snapshot", "latest", "history")
//! - `provider`: upstream name (e.g. "coingecko", "coinmarketcap", "ecb")
//! - `operation`: upstream call or coalesced operation (e.g. "market_chart")
//! - `status`: outcome: "ok" or "error"

/// Total TTL cache hits.
///
/// Labels: `cache`.
pub const CACHE_HITS_TOTAL: &str = "pricegate_cache_hits_total";

/// Total TTL cache misses (absent or older than the entry's TTL).
///
/// Labels: `cache`.
pub const CACHE_MISSES_TOTAL: &str = "pricegate_cache_misses_total";

/// Entries dropped by the periodic sweep.
///
/// Labels: `cache`.
pub const CACHE_EVICTIONS_TOTAL: &str = "pricegate_cache_evictions_total";

/// Callers that joined an already in-flight computation instead of
/// starting their own.
///
/// Labels: `operation`.
pub const COALESCED_TOTAL: &str = "pricegate_coalesced_total";

/// Upstream calls, counted once per logical call (retries excluded).
///
/// Labels: `provider`, `operation`, `status`.
pub const UPSTREAM_REQUESTS_TOTAL: &str = "pricegate_upstream_requests_total";

/// Retry attempts against an upstream (not counting the initial request).
///
/// Labels: `provider`, `operation`.
pub const UPSTREAM_RETRIES_TOTAL: &str = "pricegate_upstream_retries_total";

/// Persistent store writes.
///
/// Labels: `store`, `status`.
pub const STORE_WRITES_TOTAL: &str = "pricegate_store_writes_total";

/// Identifiers that failed during a prewarm sweep.
pub const PREWARM_FAILURES_TOTAL: &str = "pricegate_prewarm_failures_total";
