//! Pricegate - Caching gateway for cryptocurrency market data
//!
//! This crate sits between clients and rate-limited upstream market data
//! APIs (CoinGecko, CoinMarketCap, ECB reference rates). Reads are served
//! from TTL caches and small persisted catalogs; concurrent misses for the
//! same query share one upstream call; a scheduler keeps the hot data warm.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pricegate::service::PriceService;
//! use pricegate::types::HistoryRange;
//! use pricegate::upstream::CoinGeckoClient;
//!
//! #[tokio::main]
//! async fn main() -> pricegate::Result<()> {
//!     let service = PriceService::builder(Arc::new(CoinGeckoClient::new(None)?))
//!         .data_dir("/tmp/pricegate")
//!         .build()?;
//!
//!     let latest = service.get_latest(&["bitcoin".to_string()]).await?;
//!     println!("{:?}", latest.prices.get("bitcoin"));
//!
//!     let week = service.get_history("bitcoin", HistoryRange::Week, None).await?;
//!     println!("{} points", week.prices.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod fx;
pub mod history;
pub mod mapping;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod upstream;

// Re-export main types at crate root
pub use error::{PriceGateError, Result};
pub use fx::{FxService, convert_to_usd};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use service::{PriceService, PriceServiceBuilder};

pub use types::{
    Coin, CoinMeta, CoinMetaResponse, CoinsSnapshot, History, HistoryPoint, HistoryRange,
    LatestPrices, PricePoint, Rates, Resolution,
};
