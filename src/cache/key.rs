//! Deterministic cache keys.

use std::fmt;

use crate::types::{HistoryRange, Resolution};

/// A normalized cache key.
///
/// Equal logical queries always produce equal keys: identifiers are case
/// folded, and identifier sets are trimmed, deduplicated and sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key of a provider's top listing snapshot.
    pub fn snapshot(provider: &str) -> Self {
        Self(format!("{}:snapshot", provider.to_lowercase()))
    }

    /// Key of a provider's latest prices for a set of identifiers.
    ///
    /// An empty (or all-blank) set means the full top set.
    pub fn latest(provider: &str, ids: &[String]) -> Self {
        let ids = normalize_ids(ids);
        let provider = provider.to_lowercase();
        if ids.is_empty() {
            Self(format!("{provider}:latest:top"))
        } else {
            Self(format!("{provider}:latest:{}", ids.join(",")))
        }
    }

    /// Key of a history series, e.g. `bitcoin:365:daily`.
    pub fn history(id: &str, days: HistoryRange, resolution: Resolution) -> Self {
        Self(format!("{id}:{days}:{resolution}").to_lowercase())
    }

    /// Coalescer key for `operation` over this cache key (`"history:" + key`).
    pub fn namespaced(&self, operation: &str) -> String {
        format!("{operation}:{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trim, lowercase, drop blanks, sort and dedup identifiers.
pub fn normalize_ids(ids: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = ids
        .iter()
        .map(|id| id.trim().to_lowercase())
        .filter(|id| !id.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn equal_id_sets_normalize_to_equal_keys() {
        let a = CacheKey::latest("coingecko", &ids(&["Ethereum", "bitcoin", " BITCOIN "]));
        let b = CacheKey::latest("CoinGecko", &ids(&["bitcoin", "ethereum"]));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "coingecko:latest:bitcoin,ethereum");
    }

    #[test]
    fn empty_id_set_is_the_top_set() {
        let key = CacheKey::latest("coinmarketcap", &ids(&["", "  "]));
        assert_eq!(key.as_str(), "coinmarketcap:latest:top");
        assert_eq!(key, CacheKey::latest("coinmarketcap", &[]));
    }

    #[test]
    fn history_keys_are_lowercase() {
        let key = CacheKey::history("Bitcoin", HistoryRange::Year, Resolution::Daily);
        assert_eq!(key.to_string(), "bitcoin:365:daily");
        assert_eq!(key.namespaced("history"), "history:bitcoin:365:daily");
    }

    #[test]
    fn normalize_ids_sorts_and_dedups() {
        assert_eq!(
            normalize_ids(&ids(&["b", "A", "a", " ", "c "])),
            ids(&["a", "b", "c"])
        );
    }
}
