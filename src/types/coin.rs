//! Coin listing and catalog types.

use serde::{Deserialize, Serialize};

/// A coin in the top market listing, with its current market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    /// Provider identifier (e.g. "bitcoin").
    pub id: String,
    /// Uppercase ticker (e.g. "BTC").
    pub symbol: String,
    /// Display name (e.g. "Bitcoin").
    pub name: String,
    /// Logo URL.
    pub image: String,
    pub current_price: f64,
    pub market_cap: f64,
    pub market_cap_rank: Option<u32>,
    #[serde(rename = "price_change_percentage_24h")]
    pub price_change_24h: f64,
}

/// Top market listing snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinsSnapshot {
    pub coins: Vec<Coin>,
    /// Unix milliseconds at which the listing was fetched upstream.
    pub timestamp: i64,
    pub cached: bool,
}

/// A single coin from a `/coins/markets` style listing, as returned upstream.
///
/// Numeric fields are nullable upstream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketCoin {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
}

impl From<MarketCoin> for Coin {
    fn from(mc: MarketCoin) -> Self {
        Coin {
            symbol: mc.symbol.to_uppercase(),
            id: mc.id,
            name: mc.name,
            image: mc.image.unwrap_or_default(),
            current_price: mc.current_price.unwrap_or_default(),
            market_cap: mc.market_cap.unwrap_or_default(),
            market_cap_rank: mc.market_cap_rank,
            price_change_24h: mc.price_change_percentage_24h.unwrap_or_default(),
        }
    }
}

impl From<&MarketCoin> for CoinMeta {
    fn from(mc: &MarketCoin) -> Self {
        CoinMeta {
            id: mc.id.clone(),
            symbol: mc.symbol.clone(),
            name: mc.name.clone(),
            image: mc.image.clone().unwrap_or_default(),
        }
    }
}

/// Static coin metadata (no prices).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinMeta {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image: String,
}

impl CoinMeta {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            name: name.into(),
            image: String::new(),
        }
    }
}

/// Persisted coin catalog payload (`{"coins": [...]}` next to `updated_at`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoinCatalog {
    pub coins: Vec<CoinMeta>,
}

/// Coin metadata as served to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinMetaResponse {
    pub coins: Vec<CoinMeta>,
    pub timestamp: i64,
    pub cached: bool,
}
