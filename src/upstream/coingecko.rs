//! CoinGecko API client.
//!
//! See: <https://docs.coingecko.com/reference/introduction>

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{DEFAULT_TIMEOUT, MarketDataSource, handle_response_errors, http_client, trim_base_url};
use crate::types::{HistoryPoint, HistoryRange, MarketCoin, PricePoint, Resolution};
use crate::{PriceGateError, Result};

/// Default base URL for the public CoinGecko API.
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Maximum page size accepted by `/coins/markets`.
pub const MAX_PER_PAGE: u32 = 250;

const PROVIDER: &str = "coingecko";

/// Client for the CoinGecko REST API.
#[derive(Clone)]
pub struct CoinGeckoClient {
    api_key: Option<String>,
    http: Client,
    base_url: String,
}

impl CoinGeckoClient {
    /// Create a client against the public API.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            http: http_client(timeout)?,
            base_url: trim_base_url(base_url),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.get(&url).query(query).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PriceGateError::Http(e.to_string()))?;

        handle_response_errors(&response, PROVIDER)?;

        response
            .json()
            .await
            .map_err(|e| PriceGateError::Decode(format!("{PROVIDER} {path}: {e}")))
    }

    fn market_query(per_page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("vs_currency", "usd".to_string()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", per_page.clamp(1, MAX_PER_PAGE).to_string()),
            ("precision", "full".to_string()),
        ]
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn markets_page(&self, page: u32, per_page: u32) -> Result<Vec<MarketCoin>> {
        let mut query = Self::market_query(per_page);
        query.push(("page", page.max(1).to_string()));
        self.get("/coins/markets", &query).await
    }

    async fn markets_by_symbols(&self, symbols: &[String]) -> Result<Vec<MarketCoin>> {
        let symbols: Vec<String> = symbols
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = Self::market_query(MAX_PER_PAGE);
        query.push(("symbols", symbols.join(",")));
        self.get("/coins/markets", &query).await
    }

    async fn simple_prices(&self, ids: &[String]) -> Result<BTreeMap<String, PricePoint>> {
        if ids.is_empty() {
            return Err(PriceGateError::InvalidInput("no ids requested".into()));
        }
        let query = [
            ("ids", ids.join(",")),
            ("vs_currencies", "usd".to_string()),
            ("include_last_updated_at", "true".to_string()),
            ("precision", "full".to_string()),
        ];
        let raw: BTreeMap<String, SimplePrice> = self.get("/simple/price", &query).await?;

        // Ids without a USD quote come back as `{}`.
        Ok(raw
            .into_iter()
            .filter_map(|(id, p)| {
                p.usd.map(|usd| {
                    (id, PricePoint { usd, last_updated_at: p.last_updated_at })
                })
            })
            .collect())
    }

    async fn market_chart(
        &self,
        id: &str,
        days: HistoryRange,
        resolution: Resolution,
    ) -> Result<Vec<HistoryPoint>> {
        let query = [
            ("vs_currency", "usd".to_string()),
            ("days", days.to_string()),
            ("interval", resolution.to_string()),
        ];
        let chart: MarketChart = self.get(&format!("/coins/{id}/market_chart"), &query).await?;

        let mut prices: Vec<HistoryPoint> = chart
            .prices
            .into_iter()
            .map(|[timestamp, price]| HistoryPoint {
                timestamp: timestamp as i64,
                price,
            })
            .collect();
        prices.sort_by_key(|p| p.timestamp);
        debug!(id, days = %days, points = prices.len(), "fetched market chart");
        Ok(prices)
    }
}

#[derive(Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    last_updated_at: Option<i64>,
}

#[derive(Deserialize)]
struct MarketChart {
    prices: Vec<[f64; 2]>,
}
