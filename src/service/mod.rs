//! The price service: caches, stores and coalescers behind one handle.
//!
//! Every read follows the same path: join (or start) the coalesced
//! computation for the query, which re-checks the cache or store, falls
//! through to the upstream source on a miss, and writes the result back.
//! The [`Scheduler`](crate::scheduler::Scheduler) drives the same paths on
//! fixed intervals.

mod builder;

pub use builder::{CMC_META_FILE, COIN_META_FILE, MAPPING_FILE, PriceServiceBuilder};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheTtls, TtlCache, normalize_ids};
use crate::coalesce::Coalescer;
use crate::history::{self, HistoryRequest};
use crate::mapping::{self, MappingTable};
use crate::store::{PersistentRecord, PersistentStore};
use crate::types::{
    Coin, CoinCatalog, CoinMeta, CoinMetaResponse, CoinsSnapshot, History, HistoryRange,
    LatestPrices, Resolution, now_millis,
};
use crate::upstream::{ListingSource, MarketDataSource};
use crate::{PriceGateError, Result};

/// Symbols per `markets_by_symbols` call while building the mapping.
const SYMBOL_CHUNK: usize = 50;

/// Tunables for upstream listing sizes.
#[derive(Debug, Clone)]
pub(crate) struct ServiceSettings {
    pub markets_per_page: u32,
    pub meta_pages: u32,
    pub listing_limit: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            markets_per_page: 250,
            meta_pages: 1,
            listing_limit: 100,
        }
    }
}

/// Shared handle to the caching layer. Cheap to clone.
#[derive(Clone)]
pub struct PriceService {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    market: Arc<dyn MarketDataSource>,
    listings: Option<Arc<dyn ListingSource>>,
    ttls: CacheTtls,
    settings: ServiceSettings,

    snapshots: TtlCache<CoinsSnapshot>,
    latest: TtlCache<LatestPrices>,
    history: TtlCache<History>,

    coin_meta: PersistentStore<CoinCatalog>,
    cmc_meta: PersistentStore<CoinCatalog>,
    mapping: PersistentStore<MappingTable>,

    snapshot_flight: Coalescer<CoinsSnapshot>,
    latest_flight: Coalescer<LatestPrices>,
    history_flight: Coalescer<History>,
    meta_flight: Coalescer<CoinMetaResponse>,
    mapping_flight: Coalescer<MappingTable>,
}

/// Which side of the metadata pair a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Catalog {
    CoinGecko,
    CoinMarketCap,
}

impl Catalog {
    fn name(self) -> &'static str {
        match self {
            Self::CoinGecko => "coins_meta",
            Self::CoinMarketCap => "cmc_coins_meta",
        }
    }
}

impl PriceService {
    /// Start configuring a service around a market data source.
    pub fn builder(market: Arc<dyn MarketDataSource>) -> PriceServiceBuilder {
        PriceServiceBuilder::new(market)
    }

    /// Whether a CoinMarketCap listing source is configured.
    pub fn has_listing_source(&self) -> bool {
        self.inner.listings.is_some()
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.inner.ttls
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    /// Top market listing.
    pub async fn get_snapshot(&self) -> Result<CoinsSnapshot> {
        self.snapshot(false).await
    }

    /// Refetch the top market listing regardless of cache state.
    pub async fn refresh_snapshot(&self) -> Result<CoinsSnapshot> {
        self.snapshot(true).await
    }

    async fn snapshot(&self, force: bool) -> Result<CoinsSnapshot> {
        let key = CacheKey::snapshot(self.inner.market.name());
        let inner = Arc::clone(&self.inner);
        let cache_key = key.clone();
        self.inner
            .snapshot_flight
            .run(&flight_key(&key, "snapshot", force), move || async move {
                if !force {
                    if let Some(mut snapshot) = inner.snapshots.get(cache_key.as_str()) {
                        debug!(key = %cache_key, "cache hit for snapshot");
                        snapshot.cached = true;
                        return Ok(snapshot);
                    }
                }
                inner.fetch_snapshot(&cache_key).await
            })
            .await
            .into_result()
    }

    // ========================================================================
    // Metadata catalogs
    // ========================================================================

    /// CoinGecko coin metadata, persisted and refreshed when older than
    /// the configured max age.
    pub async fn get_coin_meta(&self) -> Result<CoinMetaResponse> {
        self.coin_meta(Catalog::CoinGecko).await
    }

    /// CoinMarketCap coin metadata, persisted like [`get_coin_meta()`](Self::get_coin_meta).
    pub async fn get_cmc_coin_meta(&self) -> Result<CoinMetaResponse> {
        self.coin_meta(Catalog::CoinMarketCap).await
    }

    async fn coin_meta(&self, catalog: Catalog) -> Result<CoinMetaResponse> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .meta_flight
            .run(&format!("meta:{}", catalog.name()), move || async move {
                inner.load_or_fetch_meta(catalog).await
            })
            .await
            .into_result()
    }

    // ========================================================================
    // Latest prices
    // ========================================================================

    /// Latest CoinGecko prices for `ids` (all catalog coins when empty).
    ///
    /// Unknown identifiers are omitted from the result.
    pub async fn get_latest(&self, ids: &[String]) -> Result<LatestPrices> {
        let top = self.top_prices(Catalog::CoinGecko, false).await?;
        Ok(filter_latest(top, ids))
    }

    /// Latest CoinMarketCap prices for `ids` (the whole listing when empty).
    pub async fn get_cmc_latest(&self, ids: &[String]) -> Result<LatestPrices> {
        let top = self.top_prices(Catalog::CoinMarketCap, false).await?;
        Ok(filter_latest(top, ids))
    }

    /// Refetch the CoinGecko top prices regardless of cache state.
    pub async fn refresh_latest(&self) -> Result<LatestPrices> {
        self.top_prices(Catalog::CoinGecko, true).await
    }

    /// Refetch the CoinMarketCap listing regardless of cache state.
    pub async fn refresh_cmc_latest(&self) -> Result<LatestPrices> {
        self.top_prices(Catalog::CoinMarketCap, true).await
    }

    async fn top_prices(&self, catalog: Catalog, force: bool) -> Result<LatestPrices> {
        let provider = match catalog {
            Catalog::CoinGecko => self.inner.market.name().to_string(),
            Catalog::CoinMarketCap => self.inner.listing_source()?.name().to_string(),
        };
        let key = CacheKey::latest(&provider, &[]);
        let inner = Arc::clone(&self.inner);
        let service = self.clone();
        let cache_key = key.clone();
        self.inner
            .latest_flight
            .run(&flight_key(&key, "latest", force), move || async move {
                if !force {
                    if let Some(mut latest) = inner.latest.get(cache_key.as_str()) {
                        debug!(key = %cache_key, "cache hit for latest prices");
                        latest.cached = true;
                        return Ok(latest);
                    }
                }
                info!(key = %cache_key, "cache miss for latest prices, fetching");
                let prices = match catalog {
                    Catalog::CoinGecko => {
                        let meta = service.get_coin_meta().await?;
                        let ids: Vec<String> = meta
                            .coins
                            .iter()
                            .filter(|c| !c.id.is_empty())
                            .map(|c| c.id.to_lowercase())
                            .collect();
                        if ids.is_empty() {
                            return Err(PriceGateError::NotAvailable(
                                "no ids available for top prices".into(),
                            ));
                        }
                        inner.market.simple_prices(&ids).await?
                    }
                    Catalog::CoinMarketCap => {
                        let limit = inner.settings.listing_limit;
                        inner.listing_source()?.latest_listings(limit).await?
                    }
                };
                let latest = LatestPrices {
                    prices,
                    timestamp: now_millis(),
                    cached: false,
                };
                inner.latest.set(cache_key.as_str(), latest.clone());
                Ok(latest)
            })
            .await
            .into_result()
    }

    // ========================================================================
    // History
    // ========================================================================

    /// History for `id` over `days`, fetching the canonical series on a miss.
    pub async fn get_history(
        &self,
        id: &str,
        days: HistoryRange,
        resolution: Option<Resolution>,
    ) -> Result<History> {
        let request = HistoryRequest::new(id, days, resolution)?;
        let canonical = history::canonicalize(&request);
        let key = canonical.cache_key();

        let inner = Arc::clone(&self.inner);
        let cache_key = key.clone();
        let series = self
            .inner
            .history_flight
            .run(&key.namespaced("history"), move || async move {
                if let Some(mut series) = inner.history.get(cache_key.as_str()) {
                    debug!(key = %cache_key, "cache hit for history");
                    series.cached = true;
                    return Ok(series);
                }
                info!(key = %cache_key, "cache miss for history, fetching");
                let prices = inner
                    .market
                    .market_chart(&canonical.id, canonical.days, canonical.resolution)
                    .await
                    .inspect_err(|e| warn!(key = %cache_key, error = %e, "history fetch failed"))?;
                let series = History {
                    id: canonical.id.clone(),
                    days: canonical.days,
                    interval: canonical.resolution,
                    prices,
                    timestamp: now_millis(),
                    cached: false,
                };
                let ttl = inner.ttls.history_for(canonical.days);
                inner.history.set_with_ttl(cache_key.as_str(), series.clone(), ttl);
                Ok(series)
            })
            .await
            .into_result()?;

        Ok(history::slice(&series, &request))
    }

    /// History for `id` from cache only; never triggers an upstream fetch.
    ///
    /// Fails with [`PriceGateError::NotAvailable`] when the canonical series
    /// is not warm.
    pub async fn get_history_cached_only(
        &self,
        id: &str,
        days: HistoryRange,
        resolution: Option<Resolution>,
    ) -> Result<History> {
        let request = HistoryRequest::new(id, days, resolution)?;
        let key = history::canonicalize(&request).cache_key();
        let mut series = self
            .inner
            .history
            .get(key.as_str())
            .ok_or_else(|| PriceGateError::NotAvailable(format!("history not cached for {key}")))?;
        series.cached = true;
        Ok(history::slice(&series, &request))
    }

    /// Whether the canonical series for `id` is cached and fresh.
    pub fn history_is_warm(&self, id: &str) -> bool {
        let Ok(request) = HistoryRequest::new(id, HistoryRange::Year, None) else {
            return false;
        };
        let key = history::canonicalize(&request).cache_key();
        self.inner.history.contains_fresh(key.as_str())
    }

    // ========================================================================
    // Cross-provider mapping
    // ========================================================================

    /// CoinGecko id for a CoinMarketCap id.
    pub async fn resolve_cmc_id(&self, cmc_id: &str) -> Result<String> {
        let cmc_id = cmc_id.trim();
        if cmc_id.is_empty() {
            return Err(PriceGateError::InvalidInput("cmc_id cannot be empty".into()));
        }
        let table = self.stored_mapping().await?;
        let entry = table.get(cmc_id).ok_or_else(|| {
            PriceGateError::NotAvailable(format!("no coingecko mapping for cmc_id {cmc_id}"))
        })?;
        entry.canonical_id.clone().ok_or_else(|| {
            PriceGateError::NotAvailable(format!("cmc_id {cmc_id} has no coingecko mapping"))
        })
    }

    /// Build and persist the mapping unless one already exists.
    pub async fn ensure_mapping(&self) -> Result<MappingTable> {
        if let Some(record) = self.inner.mapping.get().await? {
            if !record.payload.is_empty() {
                return Ok(record.payload);
            }
        }
        self.rebuild_mapping().await
    }

    /// Build the mapping from current catalogs and replace the stored one.
    pub async fn rebuild_mapping(&self) -> Result<MappingTable> {
        let service = self.clone();
        self.inner
            .mapping_flight
            .run("mapping:cmc", move || async move { service.build_mapping().await })
            .await
            .into_result()
    }

    async fn build_mapping(&self) -> Result<MappingTable> {
        let cmc = self.get_cmc_coin_meta().await?;
        let symbols: Vec<String> = cmc
            .coins
            .iter()
            .map(|c| c.symbol.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Err(PriceGateError::NotAvailable(
                "no CMC symbols available for mapping".into(),
            ));
        }

        let mut candidates = Vec::with_capacity(symbols.len());
        for chunk in symbols.chunks(SYMBOL_CHUNK) {
            let markets = self.inner.market.markets_by_symbols(chunk).await?;
            candidates.extend(markets.iter().map(CoinMeta::from));
        }

        let entries = mapping::build_mapping(&cmc.coins, &candidates);
        if entries.is_empty() {
            return Err(PriceGateError::NotAvailable("no CMC mapping entries built".into()));
        }

        let table = MappingTable { entries };
        self.inner.mapping.set(table.clone()).await?;
        info!(
            entries = table.len(),
            source = cmc.coins.len(),
            candidates = candidates.len(),
            "built CMC mapping"
        );
        Ok(table)
    }

    async fn stored_mapping(&self) -> Result<MappingTable> {
        match self.inner.mapping.get().await? {
            Some(record) if !record.payload.is_empty() => Ok(record.payload),
            _ => Err(PriceGateError::NotAvailable("cmc mapping not available".into())),
        }
    }

    /// Distinct canonical ids known to the mapping: the prewarm work list.
    pub async fn prewarm_targets(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = self
            .stored_mapping()
            .await?
            .canonical_ids()
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Err(PriceGateError::NotAvailable(
                "no coingecko ids available for prewarm".into(),
            ));
        }
        Ok(ids)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop expired entries from every in-memory cache.
    pub fn sweep_caches(&self) -> u64 {
        self.inner.snapshots.sweep() + self.inner.latest.sweep() + self.inner.history.sweep()
    }
}

impl Inner {
    fn listing_source(&self) -> Result<&Arc<dyn ListingSource>> {
        self.listings
            .as_ref()
            .ok_or_else(|| PriceGateError::Configuration("no CoinMarketCap source configured".into()))
    }

    async fn fetch_snapshot(&self, key: &CacheKey) -> Result<CoinsSnapshot> {
        info!(key = %key, "cache miss for snapshot, fetching");
        let markets = self
            .market
            .markets_page(1, self.settings.markets_per_page)
            .await?;
        let snapshot = CoinsSnapshot {
            coins: markets.into_iter().map(Coin::from).collect(),
            timestamp: now_millis(),
            cached: false,
        };
        self.snapshots.set(key.as_str(), snapshot.clone());
        Ok(snapshot)
    }

    fn meta_store(&self, catalog: Catalog) -> &PersistentStore<CoinCatalog> {
        match catalog {
            Catalog::CoinGecko => &self.coin_meta,
            Catalog::CoinMarketCap => &self.cmc_meta,
        }
    }

    async fn load_or_fetch_meta(&self, catalog: Catalog) -> Result<CoinMetaResponse> {
        let store = self.meta_store(catalog);
        if let Some(record) = store.get().await? {
            if !record.payload.coins.is_empty() && !record.is_older_than(self.ttls.meta_max_age) {
                debug!(store = store.name(), "cache hit for coin metadata");
                return Ok(meta_response(record, true));
            }
            debug!(store = store.name(), updated_at = %record.updated_at, "coin metadata is stale");
        }

        info!(store = store.name(), "cache miss for coin metadata, fetching");
        let coins = match catalog {
            Catalog::CoinGecko => {
                let mut coins = Vec::new();
                for page in 1..=self.settings.meta_pages {
                    let markets = self
                        .market
                        .markets_page(page, self.settings.markets_per_page)
                        .await?;
                    coins.extend(markets.iter().map(|m| {
                        let mut meta = CoinMeta::from(m);
                        meta.symbol = meta.symbol.to_uppercase();
                        meta
                    }));
                }
                coins
            }
            Catalog::CoinMarketCap => {
                self.listing_source()?
                    .coin_map(self.settings.listing_limit)
                    .await?
            }
        };

        let record = store.set(CoinCatalog { coins }).await?;
        Ok(meta_response(record, false))
    }
}

fn meta_response(record: PersistentRecord<CoinCatalog>, cached: bool) -> CoinMetaResponse {
    CoinMetaResponse {
        coins: record.payload.coins,
        timestamp: record.updated_at.timestamp_millis(),
        cached,
    }
}

/// Coalescer key for a cached read or a forced refresh of `key`.
///
/// Refreshes get their own key so that a refresh never joins a cache-hit
/// read and returns without fetching.
fn flight_key(key: &CacheKey, operation: &str, force: bool) -> String {
    if force {
        key.namespaced(&format!("{operation}:refresh"))
    } else {
        key.namespaced(operation)
    }
}

fn filter_latest(top: LatestPrices, ids: &[String]) -> LatestPrices {
    let ids = normalize_ids(ids);
    if ids.is_empty() {
        top
    } else {
        top.filtered(&ids)
    }
}
