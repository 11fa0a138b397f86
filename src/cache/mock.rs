//! Test backends.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::backend::{CacheBackend, MemoryBackend};
use super::error::BackendError;
use super::key::CacheKey;
use super::types::CacheEntry;

/// Memory backend whose reads and writes can be switched to fail.
pub struct FailingBackend {
    inner: MemoryBackend,
    fail_get: AtomicBool,
    fail_insert: AtomicBool,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::new(None, None),
            fail_get: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
        }
    }

    /// Makes every `get` fail while `fail` is set.
    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    /// Makes every `insert_if_absent` fail while `fail` is set.
    pub fn fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    fn unavailable(op: &str) -> BackendError {
        BackendError::Unavailable {
            reason: format!("injected {op} failure"),
        }
    }
}

impl Default for FailingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for FailingBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, BackendError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Self::unavailable("get"));
        }
        self.inner.get(key).await
    }

    async fn insert_if_absent(&self, entry: CacheEntry) -> Result<CacheEntry, BackendError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(Self::unavailable("insert"));
        }
        self.inner.insert_if_absent(entry).await
    }

    async fn len(&self) -> Result<u64, BackendError> {
        self.inner.len().await
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, BackendError> {
        self.inner.entries().await
    }

    async fn close(&self) {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}
