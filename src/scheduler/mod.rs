//! Background refresh and prewarm jobs.
//!
//! Each job is a loop over a [`CancellationToken`] and a tokio interval,
//! owned by a [`Scheduler`] that can be started and shut down
//! deterministically.

mod limiter;
mod prewarm;

pub use limiter::RateGate;
pub use prewarm::{PrewarmReport, prewarm_history};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fx::FxService;
use crate::service::PriceService;

/// Job periods and prewarm pool settings. A zero period disables that job.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub snapshot_interval: Duration,
    pub latest_interval: Duration,
    pub cmc_latest_interval: Duration,
    pub fx_interval: Duration,
    /// Mapping ensure runs at startup and then on this period.
    pub mapping_interval: Duration,
    pub sweep_interval: Duration,
    pub prewarm_initial_delay: Duration,
    pub prewarm_interval: Duration,
    pub prewarm_workers: usize,
    /// Minimum spacing between prewarm fetches across all workers.
    pub prewarm_rate: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: Duration::from_secs(2 * 3600),
            latest_interval: Duration::from_secs(5 * 60),
            cmc_latest_interval: Duration::from_secs(5 * 60),
            fx_interval: Duration::from_secs(24 * 3600),
            mapping_interval: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(10 * 60),
            prewarm_initial_delay: Duration::from_secs(30),
            prewarm_interval: Duration::from_secs(24 * 3600),
            prewarm_workers: 5,
            prewarm_rate: Duration::from_secs(2),
        }
    }
}

/// Owner of the running background jobs.
pub struct Scheduler {
    cancel: CancellationToken,
    jobs: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    /// Spawn every configured job on the current runtime.
    ///
    /// The CoinMarketCap refresh only runs when the service has a listing
    /// source; FX refresh only runs when `fx` is given.
    pub fn start(service: PriceService, fx: Option<FxService>, config: SchedulerConfig) -> Self {
        let mut scheduler = Self {
            cancel: CancellationToken::new(),
            jobs: Vec::new(),
        };

        let svc = service.clone();
        scheduler.spawn("snapshot", Duration::ZERO, config.snapshot_interval, move || {
            let svc = svc.clone();
            async move { log_outcome("snapshot", svc.refresh_snapshot().await.map(|_| ())) }
        });

        let svc = service.clone();
        scheduler.spawn("latest", Duration::ZERO, config.latest_interval, move || {
            let svc = svc.clone();
            async move { log_outcome("latest", svc.refresh_latest().await.map(|_| ())) }
        });

        if service.has_listing_source() {
            let svc = service.clone();
            scheduler.spawn("cmc_latest", Duration::ZERO, config.cmc_latest_interval, move || {
                let svc = svc.clone();
                async move { log_outcome("cmc_latest", svc.refresh_cmc_latest().await.map(|_| ())) }
            });

            let svc = service.clone();
            scheduler.spawn("mapping", Duration::ZERO, config.mapping_interval, move || {
                let svc = svc.clone();
                async move { log_outcome("mapping", svc.ensure_mapping().await.map(|_| ())) }
            });
        } else {
            info!("no CoinMarketCap source configured, CMC jobs disabled");
        }

        if let Some(fx) = fx.clone() {
            scheduler.spawn("fx", Duration::ZERO, config.fx_interval, move || {
                let fx = fx.clone();
                async move { log_outcome("fx", fx.refresh().await.map(|_| ())) }
            });
        }

        let svc = service.clone();
        scheduler.spawn("sweep", config.sweep_interval, config.sweep_interval, move || {
            let svc = svc.clone();
            let fx = fx.clone();
            async move {
                let removed = svc.sweep_caches() + fx.map_or(0, |fx| fx.sweep());
                debug!(removed, "cache sweep");
            }
        });

        let gate = Arc::new(RateGate::new(config.prewarm_rate));
        let workers = config.prewarm_workers;
        scheduler.spawn(
            "prewarm",
            config.prewarm_initial_delay,
            config.prewarm_interval,
            move || {
                let svc = service.clone();
                let gate = Arc::clone(&gate);
                async move {
                    let outcome = prewarm_history(&svc, workers, gate)
                        .await
                        .and_then(PrewarmReport::into_result)
                        .map(|_| ());
                    log_outcome("prewarm", outcome);
                }
            },
        );

        info!(jobs = scheduler.jobs.len(), "scheduler started");
        scheduler
    }

    /// Names of the running jobs.
    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|(name, _)| *name).collect()
    }

    /// A token that is cancelled when the scheduler shuts down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every job and wait for them to stop.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in self.jobs {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(job = name, error = %e, "job ended abnormally");
                }
            }
        }
        info!("scheduler stopped");
    }

    fn spawn<F, Fut>(&mut self, name: &'static str, start_after: Duration, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            debug!(job = name, "job disabled");
            return;
        }
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(run_every(name, start_after, period, cancel, job));
        self.jobs.push((name, handle));
    }
}

async fn run_every<F, Fut>(
    name: &'static str,
    start_after: Duration,
    period: Duration,
    cancel: CancellationToken,
    job: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval_at(Instant::now() + start_after, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(job = name, period_secs = period.as_secs(), "job started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = job() => {}
                }
            }
        }
    }
    debug!(job = name, "job stopped");
}

fn log_outcome(job: &'static str, outcome: crate::Result<()>) {
    match outcome {
        Ok(()) => debug!(job, "job run succeeded"),
        Err(e) => warn!(job, error = %e, "job run failed"),
    }
}
