//! pricegated: the Pricegate daemon.
//!
//! Builds the price service from configuration and keeps its caches warm
//! with the background scheduler until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use pricegate::config::{Config, Secrets};
use pricegate::upstream::{
    CoinGeckoClient, CoinMarketCapClient, EcbClient, RatesSource, RetryingRatesSource,
};
use pricegate::{FxService, PriceGateError, PriceService, Scheduler};

/// Pricegate daemon: caching gateway for crypto market data.
#[derive(Parser)]
#[command(name = "pricegated")]
#[command(version)]
#[command(about = "Pricegate market data cache daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "PRICEGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: info; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;

    let service = build_service(&config, &secrets)?;
    let fx = build_fx(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.storage.data_dir.display(),
        cmc = service.has_listing_source(),
        "pricegated starting"
    );

    if !config.scheduler.enabled {
        warn!("scheduler disabled, nothing to do");
        return Ok(());
    }

    let scheduler = Scheduler::start(
        service,
        Some(fx),
        config.scheduler.scheduler_config(&config.cache),
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    scheduler.shutdown().await;

    Ok(())
}

/// Build the [`PriceService`] from configuration.
fn build_service(config: &Config, secrets: &Secrets) -> Result<PriceService, PriceGateError> {
    let providers = &config.providers;

    let coingecko = CoinGeckoClient::with_base_url(
        secrets.api_key("coingecko"),
        &providers.coingecko.base_url,
        Duration::from_secs(providers.coingecko.timeout_secs),
    )?;

    let mut builder = PriceService::builder(Arc::new(coingecko))
        .ttls(config.cache.ttls())
        .retry(config.retry.retry_config())
        .data_dir(&config.storage.data_dir)
        .file_names(
            &config.storage.coin_meta_file,
            &config.storage.cmc_meta_file,
            &config.storage.mapping_file,
        )
        .markets_per_page(providers.coingecko.markets_per_page)
        .meta_pages(providers.coingecko.meta_pages)
        .listing_limit(providers.coinmarketcap.listing_limit);

    // CoinMarketCap is only registered when a key is available
    match secrets.api_key("coinmarketcap") {
        Some(key) => {
            let cmc = CoinMarketCapClient::with_base_url(
                Some(key),
                &providers.coinmarketcap.base_url,
                Duration::from_secs(providers.coinmarketcap.timeout_secs),
            )?;
            builder = builder.listings(Arc::new(cmc));
        }
        None => warn!("no CoinMarketCap API key, CMC operations disabled"),
    }

    builder.build()
}

/// Build the [`FxService`] from configuration.
fn build_fx(config: &Config) -> Result<FxService, PriceGateError> {
    let ecb = EcbClient::with_base_url(
        &config.providers.fx.base_url,
        Duration::from_secs(config.providers.fx.timeout_secs),
    )?;
    let source: Arc<dyn RatesSource> = Arc::new(RetryingRatesSource::new(
        Arc::new(ecb),
        config.retry.retry_config(),
    ));
    Ok(FxService::new(source, config.cache.ttls().fx))
}
