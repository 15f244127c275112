//! Public payload types for the Pricegate API.

mod coin;
mod history;
mod price;
mod rates;

pub use coin::{Coin, CoinCatalog, CoinMeta, CoinMetaResponse, CoinsSnapshot, MarketCoin};
pub use history::{History, HistoryPoint, HistoryRange, Resolution};
pub use price::{LatestPrices, PricePoint};
pub use rates::Rates;

/// Current wall-clock time as Unix milliseconds (the `timestamp` field of
/// every response payload).
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
