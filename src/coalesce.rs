//! Request coalescing: at most one in-flight computation per key.
//!
//! The first caller for a key spawns the computation and registers a shared
//! completion handle; callers arriving while it runs attach to that handle
//! and receive a clone of the same outcome. The computation runs as its own
//! task, so it completes (and populates whatever cache it writes to) even if
//! every caller has gone away.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::Shared;
use tokio::sync::oneshot;
use tracing::debug;

use crate::telemetry;
use crate::{PriceGateError, Result};

type Completion<V> = Shared<oneshot::Receiver<Result<V>>>;
type InFlight<V> = Arc<Mutex<HashMap<String, Completion<V>>>>;

/// Outcome of [`Coalescer::run()`].
#[derive(Debug, Clone)]
pub struct Joined<V> {
    pub result: Result<V>,
    /// `true` when this caller attached to a computation started by someone else.
    pub shared: bool,
}

impl<V> Joined<V> {
    pub fn into_result(self) -> Result<V> {
        self.result
    }
}

/// In-flight call registry keyed by string.
///
/// Keys are expected to be namespaced per operation kind
/// (`"history:" + cache key`) so unrelated operations never collide.
pub struct Coalescer<V> {
    in_flight: InFlight<V>,
}

impl<V> Clone for Coalescer<V> {
    fn clone(&self) -> Self {
        Self {
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<V> Default for Coalescer<V> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Removes the key from the registry when the computation task finishes,
/// including by panic.
struct Deregister<V> {
    in_flight: InFlight<V>,
    key: String,
}

impl<V> Drop for Deregister<V> {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

fn lock<V>(in_flight: &InFlight<V>) -> MutexGuard<'_, HashMap<String, Completion<V>>> {
    // The map holds no invariants a panicking holder could break.
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V> Coalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `compute` for `key`, or join the computation already running.
    ///
    /// `compute` is only invoked by the caller that starts a new computation.
    /// It should re-check the cache itself: an earlier winner may already have
    /// populated it.
    pub async fn run<F, Fut>(&self, key: &str, compute: F) -> Joined<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let (completion, shared) = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(key) {
                Some(completion) => (completion.clone(), true),
                None => {
                    let completion = self.spawn(key, compute());
                    in_flight.insert(key.to_string(), completion.clone());
                    (completion, false)
                }
            }
        };

        if shared {
            let operation = key.split(':').next().unwrap_or(key).to_string();
            metrics::counter!(telemetry::COALESCED_TOTAL, "operation" => operation).increment(1);
            debug!(key, "joined in-flight computation");
        }

        let result = match completion.await {
            Ok(result) => result,
            Err(_) => Err(PriceGateError::Abandoned(key.to_string())),
        };
        Joined { result, shared }
    }

    /// Number of computations currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    // Called with the registry lock held; the task's deregistration waits on
    // that lock, so the key is always inserted before it can be removed.
    fn spawn<Fut>(&self, key: &str, computation: Fut) -> Completion<V>
    where
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let deregister = Deregister {
            in_flight: Arc::clone(&self.in_flight),
            key: key.to_string(),
        };

        tokio::spawn(async move {
            let result = computation.await;
            // Evict before publishing: late callers either get this handle
            // (and the result) or start a fresh computation.
            drop(deregister);
            sender.send(result).ok();
        });

        receiver.shared()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let coalescer: Coalescer<u32> = Coalescer::new();
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let coalescer = coalescer.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                coalescer
                    .run("history:bitcoin:365:daily", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(7)
                    })
                    .await
            }));
        }

        let mut shared = 0;
        for handle in handles {
            let joined = handle.await.unwrap();
            assert_eq!(joined.result.unwrap(), 7);
            if joined.shared {
                shared += 1;
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(shared, 9);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn errors_are_shared_too() {
        let coalescer: Coalescer<u32> = Coalescer::new();
        let slow = coalescer.run("latest:x", || async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Err(PriceGateError::Http("timed out".into()))
        });
        let joiner = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            coalescer
                .run("latest:x", || async { Ok(1) })
                .await
        };

        let (first, second) = tokio::join!(slow, joiner);
        assert!(matches!(first.result, Err(PriceGateError::Http(_))));
        assert!(second.shared);
        assert!(matches!(second.result, Err(PriceGateError::Http(_))));
    }

    #[tokio::test]
    async fn sequential_calls_recompute() {
        let coalescer: Coalescer<u32> = Coalescer::new();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let joined = coalescer
                .run("snapshot:coingecko", move || async move {
                    Ok(calls.fetch_add(1, Ordering::SeqCst))
                })
                .await;
            assert!(!joined.shared);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let coalescer: Coalescer<&'static str> = Coalescer::new();
        let (a, b) = tokio::join!(
            coalescer.run("history:a", || async { Ok("a") }),
            coalescer.run("latest:a", || async { Ok("b") }),
        );
        assert_eq!(a.result.unwrap(), "a");
        assert_eq!(b.result.unwrap(), "b");
        assert!(!a.shared && !b.shared);
    }

    #[tokio::test]
    async fn panicking_computation_reports_abandoned() {
        let coalescer: Coalescer<u32> = Coalescer::new();
        let joined = coalescer
            .run("fx:rates", || async { panic!("boom") })
            .await;
        assert!(matches!(joined.result, Err(PriceGateError::Abandoned(k)) if k == "fx:rates"));
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn computation_finishes_after_caller_drops() {
        let coalescer: Coalescer<u32> = Coalescer::new();
        let done = Arc::new(AtomicU32::new(0));

        let flag = Arc::clone(&done);
        let caller = coalescer.run("history:btc", move || async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(1, Ordering::SeqCst);
            Ok(1)
        });
        // Poll once so the computation gets spawned, then abandon the caller.
        let _ = tokio::time::timeout(Duration::from_millis(1), caller).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
