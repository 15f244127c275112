//! Shared ticking gate for upstream request pacing.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Hands out one permit per `period`, shared by any number of workers.
///
/// The first permit is immediate. Missed ticks are not bursted: a worker
/// that arrives late still waits a full period after the previous permit.
pub struct RateGate {
    ticker: Mutex<Interval>,
    period: Duration,
}

impl RateGate {
    /// Create a gate. Must be called within a tokio runtime; a zero
    /// `period` is raised to one millisecond.
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker: Mutex::new(ticker),
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next permit.
    pub async fn acquire(&self) {
        self.ticker.lock().await.tick().await;
    }
}
