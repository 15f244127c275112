//! Latest price types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single current price quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub usd: f64,
    /// Unix seconds of the upstream quote, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<i64>,
}

/// Latest prices keyed by provider identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestPrices {
    pub prices: BTreeMap<String, PricePoint>,
    pub timestamp: i64,
    pub cached: bool,
}

impl LatestPrices {
    /// Copy of this snapshot restricted to `ids` (already normalized).
    ///
    /// Identifiers without a quote are silently dropped.
    pub fn filtered(&self, ids: &[String]) -> LatestPrices {
        let prices = ids
            .iter()
            .filter_map(|id| self.prices.get(id).map(|p| (id.clone(), *p)))
            .collect();
        LatestPrices {
            prices,
            timestamp: self.timestamp,
            cached: self.cached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_keeps_requested_ids_only() {
        let mut prices = BTreeMap::new();
        prices.insert("bitcoin".to_string(), PricePoint { usd: 42_000.0, last_updated_at: None });
        prices.insert("ethereum".to_string(), PricePoint { usd: 2_500.0, last_updated_at: None });
        let latest = LatestPrices { prices, timestamp: 7, cached: true };

        let filtered = latest.filtered(&["ethereum".to_string(), "dogecoin".to_string()]);
        assert_eq!(filtered.prices.len(), 1);
        assert_eq!(filtered.prices["ethereum"].usd, 2_500.0);
        assert_eq!(filtered.timestamp, 7);
        assert!(filtered.cached);
    }
}
