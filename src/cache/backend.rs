//! Key-value store behind the dedup cache.
//!
//! [`CacheBackend`] is the seam for the store; [`MemoryBackend`] is the in-process
//! implementation (moka) with optional per-entry TTL. It is unbounded unless a
//! capacity is configured, since an evicted score would be computed again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use tracing::debug;

use super::error::BackendError;
use super::key::CacheKey;
use super::types::CacheEntry;

#[async_trait]
/// Storage operations required by [`DedupCache`](super::DedupCache).
///
/// Writes are insert-if-absent: an existing entry is never replaced.
pub trait CacheBackend: Send + Sync {
    /// Returns the entry for `key`, if present and unexpired.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, BackendError>;

    /// Stores `entry` unless its key is already present; returns whichever entry is stored.
    async fn insert_if_absent(&self, entry: CacheEntry) -> Result<CacheEntry, BackendError>;

    /// Number of stored entries.
    async fn len(&self) -> Result<u64, BackendError>;

    /// All stored entries. Remains readable after [`close`](Self::close) for final persistence.
    async fn entries(&self) -> Result<Vec<CacheEntry>, BackendError>;

    /// Stops serving `get`/`insert_if_absent`. Idempotent.
    async fn close(&self);

    /// Returns `true` once [`close`](Self::close) has run.
    fn is_closed(&self) -> bool;

    /// Short backend name for logs and readiness output.
    fn name(&self) -> &'static str;
}

/// Expires an entry `ttl` after its `created_at`, so restored entries keep their age.
struct EntryTtl {
    ttl: Duration,
}

impl Expiry<String, CacheEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        let age = Duration::from_millis(value.age_millis(chrono::Utc::now().timestamp_millis()));
        Some(self.ttl.saturating_sub(age))
    }
}

/// In-process backend built on `moka::future::Cache`.
pub struct MemoryBackend {
    entries: Cache<String, CacheEntry>,
    ttl: Option<Duration>,
    closed: AtomicBool,
}

impl MemoryBackend {
    /// Creates a backend, optionally bounded to `capacity` entries and expiring after `ttl`.
    pub fn new(capacity: Option<u64>, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder();
        if let Some(capacity) = capacity {
            builder = builder.max_capacity(capacity);
        }
        if let Some(ttl) = ttl {
            builder = builder.expire_after(EntryTtl { ttl });
        }

        Self {
            entries: builder.build(),
            ttl,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the configured TTL.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.is_closed() {
            return Err(BackendError::Closed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.entries.entry_count())
            .field("ttl", &self.ttl)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, BackendError> {
        self.ensure_open()?;
        Ok(self.entries.get(key.as_str()).await)
    }

    async fn insert_if_absent(&self, entry: CacheEntry) -> Result<CacheEntry, BackendError> {
        self.ensure_open()?;
        let stored = self
            .entries
            .entry(entry.key.clone())
            .or_insert(entry)
            .await;
        if !stored.is_fresh() {
            debug!(key = %stored.key(), "Entry already present, keeping the stored value");
        }
        Ok(stored.into_value())
    }

    async fn len(&self) -> Result<u64, BackendError> {
        self.entries.run_pending_tasks().await;
        Ok(self.entries.entry_count())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, BackendError> {
        self.entries.run_pending_tasks().await;
        Ok(self.entries.iter().map(|(_, entry)| entry).collect())
    }

    async fn close(&self) {
        // Release: pairs with the Acquire in is_closed() so callers observing the
        // flag also observe everything written before shutdown began.
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
