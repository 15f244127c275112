//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter. Each test drives a
//! current-thread runtime inside the local recorder scope so that spawned
//! tasks record into the same recorder.

mod common;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

use common::{MockListings, MockMarket, service};
use pricegate::scheduler::{RateGate, prewarm_history};
use pricegate::telemetry;
use pricegate::types::{HistoryPoint, HistoryRange, MarketCoin, PricePoint, Resolution};
use pricegate::upstream::{MarketDataSource, RetryConfig, RetryingMarketDataSource};
use pricegate::{PriceGateError, Result};

// ============================================================================
// Helpers
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Run `fut` to completion with `recorder` installed for this thread.
fn record<F: Future>(recorder: &DebuggingRecorder, fut: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    metrics::with_local_recorder(recorder, || runtime.block_on(fut))
}

/// Sum counter values named `name` whose labels include every pair in `labels`.
fn counter(snapshot: &SnapshotVec, name: &str, labels: &[(&str, &str)]) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| {
            labels.iter().all(|(k, v)| {
                key.key()
                    .labels()
                    .any(|label| label.key() == *k && label.value() == *v)
            })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn snapshot(snapshotter: &Snapshotter) -> SnapshotVec {
    snapshotter.snapshot().into_vec()
}

/// Market source whose `simple_prices` fails with a transport error `failures` times.
struct FlakyMarket {
    failures: AtomicU32,
}

#[async_trait]
impl MarketDataSource for FlakyMarket {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn markets_page(&self, _page: u32, _per_page: u32) -> Result<Vec<MarketCoin>> {
        Ok(Vec::new())
    }

    async fn markets_by_symbols(&self, _symbols: &[String]) -> Result<Vec<MarketCoin>> {
        Ok(Vec::new())
    }

    async fn simple_prices(&self, _ids: &[String]) -> Result<BTreeMap<String, PricePoint>> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PriceGateError::Http("connection reset".into()));
        }
        Ok(BTreeMap::new())
    }

    async fn market_chart(
        &self,
        _id: &str,
        _days: HistoryRange,
        _resolution: Resolution,
    ) -> Result<Vec<HistoryPoint>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn cache_hits_misses_and_upstream_calls_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let dir = tempfile::tempdir().unwrap();

    record(&recorder, async {
        let svc = service(Arc::new(MockMarket::new()), None, dir.path());
        svc.get_latest(&[]).await.unwrap();
        svc.get_latest(&[]).await.unwrap();
    });

    let snap = snapshot(&snapshotter);
    assert_eq!(counter(&snap, telemetry::CACHE_MISSES_TOTAL, &[("cache", "latest")]), 1);
    assert_eq!(counter(&snap, telemetry::CACHE_HITS_TOTAL, &[("cache", "latest")]), 1);
    assert_eq!(
        counter(
            &snap,
            telemetry::UPSTREAM_REQUESTS_TOTAL,
            &[("provider", "coingecko"), ("operation", "simple_prices"), ("status", "ok")]
        ),
        1
    );
    assert_eq!(
        counter(
            &snap,
            telemetry::STORE_WRITES_TOTAL,
            &[("store", "coins_meta"), ("status", "ok")]
        ),
        1
    );
}

#[test]
fn joined_callers_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let dir = tempfile::tempdir().unwrap();

    record(&recorder, async {
        let market = Arc::new(MockMarket::new().with_delay(Duration::from_millis(50)));
        let svc = service(market, None, dir.path());
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.get_history("bitcoin", HistoryRange::Week, None).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    });

    let snap = snapshot(&snapshotter);
    assert_eq!(counter(&snap, telemetry::COALESCED_TOTAL, &[("operation", "history")]), 4);
    assert_eq!(
        counter(
            &snap,
            telemetry::UPSTREAM_REQUESTS_TOTAL,
            &[("operation", "market_chart")]
        ),
        1
    );
}

#[test]
fn retries_are_counted_separately_from_requests() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = record(&recorder, async {
        let source = RetryingMarketDataSource::new(
            Arc::new(FlakyMarket {
                failures: AtomicU32::new(2),
            }),
            RetryConfig::new()
                .max_attempts(3)
                .initial_delay(Duration::from_millis(1)),
        );
        source.simple_prices(&["bitcoin".into()]).await
    });
    assert!(result.is_ok());

    let snap = snapshot(&snapshotter);
    assert_eq!(counter(&snap, telemetry::UPSTREAM_RETRIES_TOTAL, &[("provider", "flaky")]), 2);
    assert_eq!(
        counter(
            &snap,
            telemetry::UPSTREAM_REQUESTS_TOTAL,
            &[("provider", "flaky"), ("status", "ok")]
        ),
        1
    );
}

#[test]
fn prewarm_failures_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let dir = tempfile::tempdir().unwrap();

    let report = record(&recorder, async {
        let market = Arc::new(MockMarket::new().failing_chart("ethereum"));
        let svc = service(market, Some(Arc::new(MockListings::new())), dir.path());
        svc.ensure_mapping().await.unwrap();
        let gate = Arc::new(RateGate::new(Duration::from_millis(1)));
        prewarm_history(&svc, 2, gate).await.unwrap()
    });

    assert_eq!(report.failed, vec!["ethereum:365d".to_string()]);
    let snap = snapshot(&snapshotter);
    assert_eq!(counter(&snap, telemetry::PREWARM_FAILURES_TOTAL, &[]), 1);
    assert_eq!(
        counter(
            &snap,
            telemetry::UPSTREAM_REQUESTS_TOTAL,
            &[("operation", "market_chart"), ("status", "error")]
        ),
        1
    );
}
