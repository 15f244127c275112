//! Upstream price-data sources.
//!
//! The core only sees these traits; each returns a typed payload or a
//! classified [`PriceGateError`](crate::PriceGateError). Concrete reqwest
//! clients live in submodules, and [`retry`] wraps any source with bounded
//! retry on transient failures.

pub mod coingecko;
pub mod coinmarketcap;
pub mod ecb;
pub mod retry;

pub use coingecko::CoinGeckoClient;
pub use coinmarketcap::CoinMarketCapClient;
pub use ecb::EcbClient;
pub use retry::{RetryConfig, RetryingListingSource, RetryingMarketDataSource, RetryingRatesSource};

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{CoinMeta, HistoryPoint, HistoryRange, MarketCoin, PricePoint, Rates, Resolution};
use crate::{PriceGateError, Result};

/// Default per-request timeout for every client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// CoinGecko-shaped market data: listings, simple prices and charts.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Provider name for logging and metrics.
    fn name(&self) -> &str;

    /// One page of the market-cap ordered listing (1-based `page`).
    async fn markets_page(&self, page: u32, per_page: u32) -> Result<Vec<MarketCoin>>;

    /// Market listing entries for the given ticker symbols.
    async fn markets_by_symbols(&self, symbols: &[String]) -> Result<Vec<MarketCoin>>;

    /// Current USD prices keyed by id.
    async fn simple_prices(&self, ids: &[String]) -> Result<BTreeMap<String, PricePoint>>;

    /// Price series for `id`, ascending by timestamp.
    async fn market_chart(
        &self,
        id: &str,
        days: HistoryRange,
        resolution: Resolution,
    ) -> Result<Vec<HistoryPoint>>;
}

/// CoinMarketCap-shaped listing data.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn name(&self) -> &str;

    /// Top `limit` coins by rank, as catalog metadata.
    async fn coin_map(&self, limit: u32) -> Result<Vec<CoinMeta>>;

    /// Latest USD prices for the top `limit` coins, keyed by id.
    async fn latest_listings(&self, limit: u32) -> Result<BTreeMap<String, PricePoint>>;
}

/// Daily reference FX rates.
#[async_trait]
pub trait RatesSource: Send + Sync {
    fn name(&self) -> &str;

    /// Latest rates, in whatever base the provider publishes (EUR for ECB).
    async fn latest_rates(&self) -> Result<Rates>;
}

/// Build a reqwest client with the given timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PriceGateError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Check response status and map to the appropriate error.
pub(crate) fn handle_response_errors(response: &reqwest::Response, provider: &str) -> Result<()> {
    let status = response.status();

    if status.is_success() {
        return Ok(());
    }

    match status.as_u16() {
        401 | 403 => Err(PriceGateError::AuthenticationFailed),
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(PriceGateError::RateLimited { retry_after })
        }
        code => Err(PriceGateError::Api {
            status: code,
            message: format!("{provider} API error: {status}"),
        }),
    }
}

/// Trim a configured base URL so paths can be appended with `/`.
pub(crate) fn trim_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}
