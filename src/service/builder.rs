//! Builder for configuring [`PriceService`] instances

use std::path::PathBuf;
use std::sync::Arc;

use super::{Inner, PriceService, ServiceSettings};
use crate::cache::{CacheTtls, TtlCache};
use crate::coalesce::Coalescer;
use crate::store::PersistentStore;
use crate::upstream::{
    ListingSource, MarketDataSource, RetryConfig, RetryingListingSource, RetryingMarketDataSource,
};
use crate::{PriceGateError, Result};

/// Default file name of the CoinGecko metadata catalog.
pub const COIN_META_FILE: &str = "coins_meta.json";
/// Default file name of the CoinMarketCap metadata catalog.
pub const CMC_META_FILE: &str = "cmc_coins_meta.json";
/// Default file name of the CoinMarketCap → CoinGecko mapping.
pub const MAPPING_FILE: &str = "cmc_mapping.json";

/// Builder for configuring a [`PriceService`].
///
/// Sources passed in are wrapped with the configured [`RetryConfig`].
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use pricegate::service::PriceService;
/// # use pricegate::upstream::CoinGeckoClient;
/// # fn main() -> pricegate::Result<()> {
/// let service = PriceService::builder(Arc::new(CoinGeckoClient::new(None)?))
///     .data_dir("/var/lib/pricegate")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct PriceServiceBuilder {
    market: Arc<dyn MarketDataSource>,
    listings: Option<Arc<dyn ListingSource>>,
    ttls: CacheTtls,
    retry: RetryConfig,
    data_dir: Option<PathBuf>,
    coin_meta_file: String,
    cmc_meta_file: String,
    mapping_file: String,
    settings: ServiceSettings,
}

impl PriceServiceBuilder {
    pub fn new(market: Arc<dyn MarketDataSource>) -> Self {
        Self {
            market,
            listings: None,
            ttls: CacheTtls::default(),
            retry: RetryConfig::default(),
            data_dir: None,
            coin_meta_file: COIN_META_FILE.to_string(),
            cmc_meta_file: CMC_META_FILE.to_string(),
            mapping_file: MAPPING_FILE.to_string(),
            settings: ServiceSettings::default(),
        }
    }

    /// Configure the CoinMarketCap-shaped listing source.
    ///
    /// Without one, CoinMarketCap operations fail with a configuration error.
    pub fn listings(mut self, source: Arc<dyn ListingSource>) -> Self {
        self.listings = Some(source);
        self
    }

    pub fn ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    /// Retry policy applied to every upstream source.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Directory for persisted catalogs and the mapping (created if absent).
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Override the persisted file names (relative to `data_dir`).
    pub fn file_names(
        mut self,
        coin_meta: impl Into<String>,
        cmc_meta: impl Into<String>,
        mapping: impl Into<String>,
    ) -> Self {
        self.coin_meta_file = coin_meta.into();
        self.cmc_meta_file = cmc_meta.into();
        self.mapping_file = mapping.into();
        self
    }

    /// Page size for the market listing (default 250).
    pub fn markets_per_page(mut self, n: u32) -> Self {
        self.settings.markets_per_page = n;
        self
    }

    /// Number of market pages that make up the metadata catalog (default 1).
    pub fn meta_pages(mut self, n: u32) -> Self {
        self.settings.meta_pages = n;
        self
    }

    /// Number of CoinMarketCap coins to list (default 100).
    pub fn listing_limit(mut self, n: u32) -> Self {
        self.settings.listing_limit = n;
        self
    }

    /// Build the service.
    pub fn build(self) -> Result<PriceService> {
        let data_dir = self
            .data_dir
            .ok_or_else(|| PriceGateError::Configuration("data_dir is not configured".into()))?;
        if self.settings.markets_per_page == 0 || self.settings.meta_pages == 0 {
            return Err(PriceGateError::Configuration(
                "markets_per_page and meta_pages must be > 0".into(),
            ));
        }

        let market: Arc<dyn MarketDataSource> =
            Arc::new(RetryingMarketDataSource::new(self.market, self.retry.clone()));
        let listings = self.listings.map(|source| {
            Arc::new(RetryingListingSource::new(source, self.retry.clone())) as Arc<dyn ListingSource>
        });

        let inner = Inner {
            snapshots: TtlCache::new("snapshot", self.ttls.snapshot),
            latest: TtlCache::new("latest", self.ttls.latest),
            history: TtlCache::new("history", self.ttls.history),
            coin_meta: PersistentStore::new("coins_meta", data_dir.join(&self.coin_meta_file)),
            cmc_meta: PersistentStore::new("cmc_coins_meta", data_dir.join(&self.cmc_meta_file)),
            mapping: PersistentStore::new("cmc_mapping", data_dir.join(&self.mapping_file)),
            snapshot_flight: Coalescer::new(),
            latest_flight: Coalescer::new(),
            history_flight: Coalescer::new(),
            meta_flight: Coalescer::new(),
            mapping_flight: Coalescer::new(),
            market,
            listings,
            ttls: self.ttls,
            settings: self.settings,
        };

        Ok(PriceService {
            inner: Arc::new(inner),
        })
    }
}
