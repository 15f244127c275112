//! History request canonicalization and slicing.
//!
//! Every supported client range is served from one canonical fetch per
//! identifier: the full year at daily resolution. Shorter windows are cut
//! out of the cached series by timestamp.

use tracing::debug;

use crate::cache::CacheKey;
use crate::types::{History, HistoryRange, Resolution};
use crate::{PriceGateError, Result};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Range of the single canonical fetch.
pub const CANONICAL_RANGE: HistoryRange = HistoryRange::Year;
/// Resolution of the single canonical fetch.
pub const CANONICAL_RESOLUTION: Resolution = Resolution::Daily;

/// A validated client history request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub id: String,
    pub days: HistoryRange,
    /// Requested point spacing; `None` means no preference.
    pub resolution: Option<Resolution>,
}

impl HistoryRequest {
    pub fn new(id: impl Into<String>, days: HistoryRange, resolution: Option<Resolution>) -> Result<Self> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(PriceGateError::InvalidInput("id cannot be empty".into()));
        }
        Ok(Self { id, days, resolution })
    }

    /// Build a request from raw client strings (`days = "30"`, `interval = "daily"`).
    pub fn parse(id: &str, days: &str, interval: Option<&str>) -> Result<Self> {
        Self::new(id, days.parse()?, Resolution::parse_optional(interval)?)
    }

    /// Resolution reported back to the client.
    pub fn reported_resolution(&self) -> Resolution {
        self.resolution.unwrap_or(CANONICAL_RESOLUTION)
    }
}

/// Identity of a canonical cached series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    pub id: String,
    pub days: HistoryRange,
    pub resolution: Resolution,
}

impl HistoryKey {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::history(&self.id, self.days, self.resolution)
    }
}

/// Map a request onto the canonical fetch that serves it.
pub fn canonicalize(request: &HistoryRequest) -> HistoryKey {
    let key = HistoryKey {
        id: request.id.to_lowercase(),
        days: CANONICAL_RANGE,
        resolution: CANONICAL_RESOLUTION,
    };
    if request.days != key.days || request.resolution.is_some_and(|r| r != key.resolution) {
        debug!(
            id = %request.id,
            requested_days = %request.days,
            fetch_days = %key.days,
            fetch_interval = %key.resolution,
            "history canonicalized"
        );
    }
    key
}

/// Derive the requested window from a canonical series.
///
/// Keeps points no older than `days` before the series' last timestamp, in
/// their original order. `days` and `interval` on the result reflect the
/// request. A request for the canonical range returns the whole series.
pub fn slice(history: &History, request: &HistoryRequest) -> History {
    let mut out = History {
        id: history.id.clone(),
        days: request.days,
        interval: request.reported_resolution(),
        prices: Vec::new(),
        timestamp: history.timestamp,
        cached: history.cached,
    };

    if request.days == history.days {
        out.prices = history.prices.clone();
        return out;
    }

    let Some(last) = history.prices.last() else {
        return out;
    };
    let cutoff = last.timestamp - i64::from(request.days.days()) * MILLIS_PER_DAY;
    out.prices = history
        .prices
        .iter()
        .filter(|p| p.timestamp >= cutoff)
        .copied()
        .collect();

    debug!(id = %history.id, days = %request.days, points = out.prices.len(), "history sliced");
    out
}
