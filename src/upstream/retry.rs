//! Retry configuration, delay calculation, and source decorators.
//!
//! Provides [`RetryConfig`] for controlling retry behaviour and
//! `Retrying*Source` decorators that wrap the source traits with
//! automatic retry on transient errors.
//!
//! All decorators delegate to the shared `with_retry()` helper,
//! keeping retry logic in a single place.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{ListingSource, MarketDataSource, RatesSource};
use crate::telemetry;
use crate::types::{CoinMeta, HistoryPoint, HistoryRange, MarketCoin, PricePoint, Rates, Resolution};
use crate::Result;

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff capped at `max_delay`:
///
/// ```rust
/// # use pricegate::upstream::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// assert_eq!(config.delay_for_attempt(1), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 750ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries. Default: 10s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(750),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no retry.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay after the failed attempt number `attempt` (0-indexed):
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Like [`delay_for_attempt()`](Self::delay_for_attempt), but a provider
    /// `retry_after` hint takes precedence. The hint is still capped at
    /// `max_delay`.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|hint| hint.min(self.max_delay))
            .unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Execute an upstream call with retry logic.
///
/// Retries transient errors (see [`PriceGateError::is_transient()`](crate::PriceGateError::is_transient)) up to
/// `config.max_attempts`; permanent errors are returned immediately.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    provider: &str,
    operation: &'static str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let outcome = loop {
        match f().await {
            Ok(value) => break Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let delay = config.effective_delay(attempt, e.retry_after());
                metrics::counter!(telemetry::UPSTREAM_RETRIES_TOTAL,
                    "provider" => provider.to_owned(),
                    "operation" => operation,
                )
                .increment(1);
                warn!(
                    provider,
                    operation,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => break Err(e),
        }
    };

    let status = if outcome.is_ok() { "ok" } else { "error" };
    metrics::counter!(telemetry::UPSTREAM_REQUESTS_TOTAL,
        "provider" => provider.to_owned(),
        "operation" => operation,
        "status" => status,
    )
    .increment(1);
    outcome
}

// ============================================================================
// RetryingMarketDataSource
// ============================================================================

/// Decorator that wraps a [`MarketDataSource`] with retry logic.
pub struct RetryingMarketDataSource {
    inner: Arc<dyn MarketDataSource>,
    config: RetryConfig,
}

impl RetryingMarketDataSource {
    pub fn new(inner: Arc<dyn MarketDataSource>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl MarketDataSource for RetryingMarketDataSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn markets_page(&self, page: u32, per_page: u32) -> Result<Vec<MarketCoin>> {
        with_retry(&self.config, self.inner.name(), "markets_page", || {
            self.inner.markets_page(page, per_page)
        })
        .await
    }

    async fn markets_by_symbols(&self, symbols: &[String]) -> Result<Vec<MarketCoin>> {
        with_retry(&self.config, self.inner.name(), "markets_by_symbols", || {
            self.inner.markets_by_symbols(symbols)
        })
        .await
    }

    async fn simple_prices(&self, ids: &[String]) -> Result<BTreeMap<String, PricePoint>> {
        with_retry(&self.config, self.inner.name(), "simple_prices", || {
            self.inner.simple_prices(ids)
        })
        .await
    }

    async fn market_chart(
        &self,
        id: &str,
        days: HistoryRange,
        resolution: Resolution,
    ) -> Result<Vec<HistoryPoint>> {
        with_retry(&self.config, self.inner.name(), "market_chart", || {
            self.inner.market_chart(id, days, resolution)
        })
        .await
    }
}

// ============================================================================
// RetryingListingSource
// ============================================================================

/// Decorator that wraps a [`ListingSource`] with retry logic.
///
/// Same semantics as [`RetryingMarketDataSource`].
pub struct RetryingListingSource {
    inner: Arc<dyn ListingSource>,
    config: RetryConfig,
}

impl RetryingListingSource {
    pub fn new(inner: Arc<dyn ListingSource>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ListingSource for RetryingListingSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn coin_map(&self, limit: u32) -> Result<Vec<CoinMeta>> {
        with_retry(&self.config, self.inner.name(), "coin_map", || {
            self.inner.coin_map(limit)
        })
        .await
    }

    async fn latest_listings(&self, limit: u32) -> Result<BTreeMap<String, PricePoint>> {
        with_retry(&self.config, self.inner.name(), "latest_listings", || {
            self.inner.latest_listings(limit)
        })
        .await
    }
}

// ============================================================================
// RetryingRatesSource
// ============================================================================

/// Decorator that wraps a [`RatesSource`] with retry logic.
pub struct RetryingRatesSource {
    inner: Arc<dyn RatesSource>,
    config: RetryConfig,
}

impl RetryingRatesSource {
    pub fn new(inner: Arc<dyn RatesSource>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl RatesSource for RetryingRatesSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn latest_rates(&self) -> Result<Rates> {
        with_retry(&self.config, self.inner.name(), "latest_rates", || {
            self.inner.latest_rates()
        })
        .await
    }
}
