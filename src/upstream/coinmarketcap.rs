//! CoinMarketCap Pro API client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{DEFAULT_TIMEOUT, ListingSource, handle_response_errors, http_client, trim_base_url};
use crate::types::{CoinMeta, PricePoint};
use crate::{PriceGateError, Result};

/// Default base URL for the CoinMarketCap Pro API.
pub const DEFAULT_BASE_URL: &str = "https://pro-api.coinmarketcap.com/v1";

const PROVIDER: &str = "coinmarketcap";
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

/// Logo URL for a CoinMarketCap numeric id.
pub fn logo_url(id: u64) -> String {
    format!("https://s2.coinmarketcap.com/static/img/coins/64x64/{id}.png")
}

/// Client for the CoinMarketCap Pro API.
///
/// Every call requires an API key; without one, calls fail with
/// [`PriceGateError::Configuration`] and nothing is sent.
#[derive(Clone)]
pub struct CoinMarketCapClient {
    api_key: Option<String>,
    http: Client,
    base_url: String,
}

impl CoinMarketCapClient {
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

    /// Whether an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PriceGateError::Configuration("CMC API key not configured".into()))?;

        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .header(API_KEY_HEADER, api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| PriceGateError::Http(e.to_string()))?;

        handle_response_errors(&response, PROVIDER)?;

        response
            .json()
            .await
            .map_err(|e| PriceGateError::Decode(format!("{PROVIDER} {path}: {e}")))
    }
}

fn check_limit(limit: u32) -> Result<()> {
    if limit == 0 {
        return Err(PriceGateError::InvalidInput("limit must be > 0".into()));
    }
    Ok(())
}

#[async_trait]
impl ListingSource for CoinMarketCapClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn coin_map(&self, limit: u32) -> Result<Vec<CoinMeta>> {
        check_limit(limit)?;
        let query = [("sort", "cmc_rank".to_string()), ("limit", limit.to_string())];
        let response: DataEnvelope<MapCoin> = self.get("/cryptocurrency/map", &query).await?;

        Ok(response
            .data
            .into_iter()
            .map(|coin| CoinMeta {
                id: coin.id.to_string(),
                symbol: coin.symbol.trim().to_uppercase(),
                name: coin.name,
                image: logo_url(coin.id),
            })
            .collect())
    }

    async fn latest_listings(&self, limit: u32) -> Result<BTreeMap<String, PricePoint>> {
        check_limit(limit)?;
        let query = [
            ("start", "1".to_string()),
            ("limit", limit.to_string()),
            ("convert", "USD".to_string()),
        ];
        let response: DataEnvelope<ListingCoin> =
            self.get("/cryptocurrency/listings/latest", &query).await?;

        let now = Utc::now().timestamp();
        Ok(response
            .data
            .into_iter()
            .filter_map(|coin| {
                let usd = coin.quote.usd?;
                let last_updated_at = usd
                    .last_updated
                    .map(|t| t.timestamp())
                    .unwrap_or(now);
                Some((
                    coin.id.to_string(),
                    PricePoint {
                        usd: usd.price?,
                        last_updated_at: Some(last_updated_at),
                    },
                ))
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct MapCoin {
    id: u64,
    name: String,
    symbol: String,
}

#[derive(Deserialize)]
struct ListingCoin {
    id: u64,
    quote: Quote,
}

#[derive(Deserialize)]
struct Quote {
    #[serde(rename = "USD")]
    usd: Option<UsdQuote>,
}

#[derive(Deserialize)]
struct UsdQuote {
    price: Option<f64>,
    last_updated: Option<DateTime<Utc>>,
}
