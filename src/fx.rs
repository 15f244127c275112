//! FX rates, served in a USD base.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::coalesce::Coalescer;
use crate::types::Rates;
use crate::upstream::RatesSource;
use crate::{PriceGateError, Result};

const RATES_KEY: &str = "rates";
const COALESCE_KEY: &str = "fx:rates";
const REFRESH_KEY: &str = "fx:refresh:rates";

/// Rebase `rates` onto USD.
///
/// Every rate becomes `rate / usd`, `USD` becomes exactly 1, and `EUR` is
/// added as `1 / usd` when the input (EUR-based) set does not list it.
pub fn convert_to_usd(rates: &Rates) -> Result<Rates> {
    let usd = match rates.rates.get("USD") {
        Some(&usd) if usd > 0.0 => usd,
        _ => {
            return Err(PriceGateError::Decode(format!(
                "USD rate missing from {} rates",
                rates.base
            )));
        }
    };

    let mut converted: std::collections::BTreeMap<String, f64> = rates
        .rates
        .iter()
        .map(|(currency, rate)| (currency.clone(), rate / usd))
        .collect();
    converted.insert("USD".into(), 1.0);
    converted.entry("EUR".into()).or_insert(1.0 / usd);

    Ok(Rates {
        base: "USD".into(),
        rates: converted,
        timestamp: rates.timestamp,
        cached: rates.cached,
    })
}

/// Cached, coalesced access to USD-based FX rates.
#[derive(Clone)]
pub struct FxService {
    source: Arc<dyn RatesSource>,
    cache: TtlCache<Rates>,
    coalescer: Coalescer<Rates>,
}

impl FxService {
    pub fn new(source: Arc<dyn RatesSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: TtlCache::new("fx", ttl),
            coalescer: Coalescer::new(),
        }
    }

    /// Latest rates against USD. `cached` reports whether they came from cache.
    pub async fn get_rates(&self) -> Result<Rates> {
        let cache = self.cache.clone();
        let source = Arc::clone(&self.source);
        let joined = self
            .coalescer
            .run(COALESCE_KEY, move || async move {
                if let Some(mut rates) = cache.get(RATES_KEY) {
                    debug!("cache hit for FX rates");
                    rates.cached = true;
                    return Ok(rates);
                }
                fetch(&cache, source.as_ref()).await
            })
            .await;
        joined.into_result()
    }

    /// Fetch from upstream and overwrite the cache, regardless of freshness.
    pub async fn refresh(&self) -> Result<Rates> {
        let cache = self.cache.clone();
        let source = Arc::clone(&self.source);
        self.coalescer
            .run(REFRESH_KEY, move || async move { fetch(&cache, source.as_ref()).await })
            .await
            .into_result()
    }

    /// Drop expired entries.
    pub fn sweep(&self) -> u64 {
        self.cache.sweep()
    }
}

async fn fetch(cache: &TtlCache<Rates>, source: &dyn RatesSource) -> Result<Rates> {
    info!(provider = source.name(), "cache miss for FX rates, fetching");
    let upstream = source.latest_rates().await?;
    let mut rates = if upstream.base == "USD" {
        upstream
    } else {
        convert_to_usd(&upstream)?
    };
    rates.cached = false;
    cache.set(RATES_KEY, rates.clone());
    Ok(rates)
}
