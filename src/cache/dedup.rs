//! Single-flight score cache.
//!
//! Per key: `absent -> pending -> present`, with `pending -> absent` when the
//! computation fails. While a key is pending every caller subscribes to the same
//! flight; exactly one computation runs for it in this process.
//!
//! The computation runs in its own task, so a caller that is cancelled or times
//! out stops waiting without aborting the work other callers are waiting on.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::backend::CacheBackend;
use super::error::{CacheError, CacheResult};
use super::key::CacheKey;
use super::types::{CacheEntry, CacheStatus, Lookup};
use crate::scoring::ScoringError;

type Outcome = Option<CacheResult<f64>>;
type FlightMap = Mutex<HashMap<CacheKey, watch::Receiver<Outcome>>>;

/// Counters describing how lookups were served.
#[derive(Debug, Default)]
struct DedupCounters {
    hits: AtomicU64,
    computations: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of the dedup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DedupStats {
    pub hits: u64,
    pub computations: u64,
    pub coalesced: u64,
    pub failures: u64,
}

/// Clears the pending marker for a key when its flight ends, including by panic.
struct FlightGuard {
    key: CacheKey,
    in_flight: Arc<FlightMap>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

/// Content-addressed cache with single-flight computation.
#[derive(Clone)]
pub struct DedupCache {
    backend: Arc<dyn CacheBackend>,
    in_flight: Arc<FlightMap>,
    counters: Arc<DedupCounters>,
}

impl DedupCache {
    /// Wraps `backend` with single-flight semantics.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(DedupCounters::default()),
        }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Number of keys currently pending.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Returns `true` if `key` has a computation in progress.
    pub fn is_pending(&self, key: &CacheKey) -> bool {
        self.in_flight.lock().contains_key(key)
    }

    /// Returns a copy of the lookup counters.
    pub fn stats(&self) -> DedupStats {
        DedupStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            computations: self.counters.computations.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Returns the stored score for `key`, or computes it at most once across
    /// all concurrent callers.
    pub async fn get_or_compute<F, Fut>(&self, key: &CacheKey, compute: F) -> CacheResult<f64>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<f64, ScoringError>> + Send + 'static,
    {
        self.get_or_compute_with_status(key, compute)
            .await
            .map(|lookup| lookup.value)
    }

    /// Like [`get_or_compute`](Self::get_or_compute), also reporting whether the
    /// value was a hit, computed by this caller, or shared from another caller's flight.
    pub async fn get_or_compute_with_status<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> CacheResult<Lookup>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<f64, ScoringError>> + Send + 'static,
    {
        if let Some(entry) = self.backend.get(key).await? {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Score cache hit");
            return Ok(Lookup {
                value: entry.value,
                status: CacheStatus::Hit,
            });
        }

        let (mut rx, status) = {
            let mut in_flight = self.in_flight.lock();
            let pending = in_flight.get(key).cloned();
            match pending {
                Some(rx) => (rx, CacheStatus::Coalesced),
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key.clone(), rx.clone());
                    self.spawn_flight(key.clone(), tx, compute);
                    (rx, CacheStatus::Miss)
                }
            }
        };

        if status == CacheStatus::Coalesced {
            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Joining in-flight computation");
        }

        let result = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(CacheError::Aborted)),
            Err(_) => Err(CacheError::Aborted),
        };

        result.map(|value| Lookup { value, status })
    }

    fn spawn_flight<F, Fut>(&self, key: CacheKey, tx: watch::Sender<Outcome>, compute: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<f64, ScoringError>> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let counters = Arc::clone(&self.counters);
        let guard = FlightGuard {
            key: key.clone(),
            in_flight: Arc::clone(&self.in_flight),
        };

        tokio::spawn(async move {
            let outcome = run_flight(backend.as_ref(), &key, compute, &counters).await;
            if let Err(ref e) = outcome {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Score computation failed, not caching");
            }

            // Clear pending before publishing: callers arriving after a failure start
            // a fresh flight instead of replaying this one.
            drop(guard);
            let _ = tx.send(Some(outcome));
        });
    }
}

async fn run_flight<F, Fut>(
    backend: &dyn CacheBackend,
    key: &CacheKey,
    compute: F,
    counters: &DedupCounters,
) -> CacheResult<f64>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<f64, ScoringError>>,
{
    // A flight that finished between our miss and our election has already stored.
    if let Some(entry) = backend.get(key).await? {
        return Ok(entry.value);
    }

    counters.computations.fetch_add(1, Ordering::Relaxed);
    debug!(key = %key, "Computing score");
    let value = compute().await?;

    let stored = backend.insert_if_absent(CacheEntry::new(key, value)).await?;
    Ok(stored.value)
}

impl std::fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupCache")
            .field("backend", &self.backend.name())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
