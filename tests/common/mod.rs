//! Mock upstream sources shared by the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use pricegate::service::PriceService;
use pricegate::types::{CoinMeta, HistoryPoint, HistoryRange, MarketCoin, PricePoint, Resolution};
use pricegate::upstream::{ListingSource, MarketDataSource, RetryConfig};
use pricegate::{PriceGateError, Result};

pub const DAY_MS: i64 = 86_400_000;
/// Timestamp of the last point in every mocked series.
pub const LAST_TS: i64 = 1_700_000_000_000;

fn market_coin(id: &str, symbol: &str, name: &str, price: f64) -> MarketCoin {
    MarketCoin {
        id: id.to_string(),
        symbol: symbol.to_string(),
        name: name.to_string(),
        current_price: Some(price),
        market_cap_rank: Some(1),
        ..MarketCoin::default()
    }
}

/// Market source with call counters and optional latency.
pub struct MockMarket {
    coins: Vec<MarketCoin>,
    delay: Duration,
    failing: Vec<String>,
    pub markets_calls: AtomicU32,
    pub symbols_calls: AtomicU32,
    pub price_calls: AtomicU32,
    pub chart_calls: AtomicU32,
}

impl MockMarket {
    pub fn new() -> Self {
        Self {
            coins: vec![
                market_coin("bitcoin", "btc", "Bitcoin", 50_000.0),
                market_coin("ethereum", "eth", "Ethereum", 3_000.0),
                market_coin("dogecoin", "doge", "Dogecoin", 0.1),
                // Collides with bitcoin on symbol
                market_coin("batcoin", "btc", "Batcoin", 0.01),
            ],
            delay: Duration::ZERO,
            failing: Vec::new(),
            markets_calls: AtomicU32::new(0),
            symbols_calls: AtomicU32::new(0),
            price_calls: AtomicU32::new(0),
            chart_calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Chart fetches for `id` fail with a non-transient API error.
    pub fn failing_chart(mut self, id: &str) -> Self {
        self.failing.push(id.to_string());
        self
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl MarketDataSource for MockMarket {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn markets_page(&self, page: u32, _per_page: u32) -> Result<Vec<MarketCoin>> {
        self.markets_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if page == 1 {
            Ok(self.coins.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn markets_by_symbols(&self, symbols: &[String]) -> Result<Vec<MarketCoin>> {
        self.symbols_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .coins
            .iter()
            .filter(|c| symbols.iter().any(|s| s.eq_ignore_ascii_case(&c.symbol)))
            .cloned()
            .collect())
    }

    async fn simple_prices(&self, ids: &[String]) -> Result<BTreeMap<String, PricePoint>> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self
            .coins
            .iter()
            .filter(|c| ids.contains(&c.id))
            .map(|c| {
                (
                    c.id.clone(),
                    PricePoint {
                        usd: c.current_price.unwrap_or_default(),
                        last_updated_at: Some(1_700_000_000),
                    },
                )
            })
            .collect())
    }

    async fn market_chart(
        &self,
        id: &str,
        days: HistoryRange,
        _resolution: Resolution,
    ) -> Result<Vec<HistoryPoint>> {
        self.chart_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.failing.iter().any(|f| f == id) {
            return Err(PriceGateError::Api {
                status: 404,
                message: format!("coin {id} not found"),
            });
        }
        let points = i64::from(days.days());
        Ok((0..points)
            .map(|i| HistoryPoint {
                timestamp: LAST_TS - (points - 1 - i) * DAY_MS,
                price: 100.0 + i as f64,
            })
            .collect())
    }
}

/// CoinMarketCap-shaped listing source.
pub struct MockListings {
    pub map_calls: AtomicU32,
    pub listing_calls: AtomicU32,
}

impl MockListings {
    pub fn new() -> Self {
        Self {
            map_calls: AtomicU32::new(0),
            listing_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ListingSource for MockListings {
    fn name(&self) -> &str {
        "coinmarketcap"
    }

    async fn coin_map(&self, _limit: u32) -> Result<Vec<CoinMeta>> {
        self.map_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            CoinMeta::new("1", "BTC", "Bitcoin"),
            CoinMeta::new("1027", "ETH", "Ethereum"),
            CoinMeta::new("74", "DOGE", "Dogecoin"),
            CoinMeta::new("999", "NOPE", "Not Listed"),
        ])
    }

    async fn latest_listings(&self, _limit: u32) -> Result<BTreeMap<String, PricePoint>> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BTreeMap::from([
            (
                "1".to_string(),
                PricePoint {
                    usd: 50_100.0,
                    last_updated_at: Some(1_700_000_000),
                },
            ),
            (
                "1027".to_string(),
                PricePoint {
                    usd: 3_010.0,
                    last_updated_at: Some(1_700_000_000),
                },
            ),
        ]))
    }
}

/// Service over `market` (and `listings`, if given) persisting into `dir`.
pub fn service(
    market: Arc<MockMarket>,
    listings: Option<Arc<MockListings>>,
    dir: &std::path::Path,
) -> PriceService {
    let mut builder = PriceService::builder(market)
        .retry(RetryConfig::disabled())
        .data_dir(dir);
    if let Some(listings) = listings {
        builder = builder.listings(listings);
    }
    builder.build().unwrap()
}
