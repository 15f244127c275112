//! Cross-provider identifier mapping (CoinMarketCap → CoinGecko).
//!
//! Source coins are matched to candidate coins by ticker symbol. When
//! several candidates share a ticker, the one whose normalized name equals
//! the source name wins; failing that, the first candidate in input order is
//! taken. Source coins with no candidate are left out of the result.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::CoinMeta;

/// A resolved link from an external (CoinMarketCap) id to a canonical
/// (CoinGecko) id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(rename = "cmc_id")]
    pub external_id: String,
    pub symbol: String,
    pub name: String,
    #[serde(rename = "coingecko_id", default, skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
}

/// Persisted mapping payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MappingTable {
    pub entries: Vec<MappingEntry>,
}

impl MappingTable {
    /// Entry for an external id.
    pub fn get(&self, external_id: &str) -> Option<&MappingEntry> {
        self.entries.iter().find(|e| e.external_id == external_id)
    }

    /// Resolved canonical id for an external id, if any.
    pub fn canonical_id(&self, external_id: &str) -> Option<&str> {
        self.get(external_id)?.canonical_id.as_deref()
    }

    /// Distinct canonical ids, in table order.
    pub fn canonical_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter_map(|e| e.canonical_id.as_ref())
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Bucket key for a ticker symbol.
fn symbol_key(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Lowercase, trim, and strip spaces, `-`, `_`, `.` and `'`.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_' | '.' | '\''))
        .collect()
}

/// Match every `source` coin to a `candidates` coin by symbol.
///
/// At most one entry is produced per source id (first occurrence wins), so
/// the result is never longer than `source`.
pub fn build_mapping(source: &[CoinMeta], candidates: &[CoinMeta]) -> Vec<MappingEntry> {
    let mut by_symbol: HashMap<String, Vec<&CoinMeta>> = HashMap::with_capacity(candidates.len());
    for candidate in candidates {
        let symbol = symbol_key(&candidate.symbol);
        if symbol.is_empty() || candidate.id.is_empty() {
            continue;
        }
        by_symbol.entry(symbol).or_default().push(candidate);
    }

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(source.len());
    for coin in source {
        let symbol = symbol_key(&coin.symbol);
        if symbol.is_empty() || !seen.insert(coin.id.as_str()) {
            continue;
        }
        let Some(bucket) = by_symbol.get(&symbol) else {
            continue;
        };
        let Some(best) = pick_candidate(&coin.name, bucket) else {
            continue;
        };
        entries.push(MappingEntry {
            external_id: coin.id.clone(),
            symbol,
            name: coin.name.clone(),
            canonical_id: Some(best.id.clone()),
        });
    }
    entries
}

fn pick_candidate<'a>(name: &str, bucket: &[&'a CoinMeta]) -> Option<&'a CoinMeta> {
    if let [only] = bucket {
        return Some(*only);
    }
    let target = normalize_name(name);
    bucket
        .iter()
        .find(|c| normalize_name(&c.name) == target)
        .or_else(|| bucket.first())
        .copied()
}
