//! Rate-limited history prewarm over every mapped identifier.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::RateGate;
use crate::service::PriceService;
use crate::telemetry;
use crate::types::HistoryRange;
use crate::{PriceGateError, Result};

/// Outcome of one prewarm sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrewarmReport {
    /// Identifiers enqueued.
    pub total: usize,
    /// Identifiers fetched and cached by this sweep.
    pub warmed: usize,
    /// Identifiers already warm, left alone.
    pub skipped: usize,
    /// `"{id}:{days}d"` for every identifier whose fetch failed.
    pub failed: Vec<String>,
}

impl PrewarmReport {
    /// `Ok` if nothing failed, otherwise [`PriceGateError::PartialFailure`].
    pub fn into_result(self) -> Result<Self> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(PriceGateError::PartialFailure {
                failed: self.failed,
            })
        }
    }

    fn merge(&mut self, other: PrewarmReport) {
        self.warmed += other.warmed;
        self.skipped += other.skipped;
        self.failed.extend(other.failed);
    }
}

/// Warm the canonical history of every identifier known to the mapping.
///
/// `workers` tasks pull identifiers from a shared queue. Identifiers that are
/// already warm are skipped without touching the gate; every fetch waits for
/// a permit from `gate` first. Failures are collected, not retried.
pub async fn prewarm_history(
    service: &PriceService,
    workers: usize,
    gate: Arc<RateGate>,
) -> Result<PrewarmReport> {
    let targets = service.prewarm_targets().await?;
    let total = targets.len();
    let queue = Arc::new(Mutex::new(VecDeque::from(targets)));

    info!(total, workers, rate_ms = gate.period().as_millis() as u64, "prewarm started");

    let mut pool = JoinSet::new();
    for _ in 0..workers.max(1) {
        pool.spawn(worker(service.clone(), Arc::clone(&queue), Arc::clone(&gate)));
    }

    let mut report = PrewarmReport {
        total,
        ..PrewarmReport::default()
    };
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(tally) => report.merge(tally),
            Err(e) => warn!(error = %e, "prewarm worker ended abnormally"),
        }
    }

    info!(
        total = report.total,
        warmed = report.warmed,
        skipped = report.skipped,
        failed = report.failed.len(),
        "prewarm finished"
    );
    Ok(report)
}

async fn worker(
    service: PriceService,
    queue: Arc<Mutex<VecDeque<String>>>,
    gate: Arc<RateGate>,
) -> PrewarmReport {
    let range = HistoryRange::Year;
    let mut tally = PrewarmReport::default();
    loop {
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(id) = next else {
            break;
        };

        if service.history_is_warm(&id) {
            debug!(id, "history already warm");
            tally.skipped += 1;
            continue;
        }

        gate.acquire().await;
        match service.get_history(&id, range, None).await {
            Ok(_) => tally.warmed += 1,
            Err(e) => {
                warn!(id, days = %range, error = %e, "prewarm failed");
                metrics::counter!(telemetry::PREWARM_FAILURES_TOTAL).increment(1);
                tally.failed.push(format!("{id}:{}d", range.days()));
            }
        }
    }
    tally
}
