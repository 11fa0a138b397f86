use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use super::error::LifecycleResult;
use super::snapshot::dehydrate;
use super::types::DehydrationResult;
use crate::cache::CacheBackend;

/// Owns the cache backend for the life of the process.
///
/// [`close`](Self::close) closes the backend and writes the snapshot exactly
/// once. Dropping an unclosed scope still closes the backend, without a snapshot.
pub struct BackendScope {
    backend: Arc<dyn CacheBackend>,
    snapshot_path: Option<PathBuf>,
    closed: AtomicBool,
}

impl BackendScope {
    pub fn new(backend: Arc<dyn CacheBackend>, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            backend,
            snapshot_path,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns a handle to the scoped backend.
    pub fn backend(&self) -> Arc<dyn CacheBackend> {
        Arc::clone(&self.backend)
    }

    pub fn snapshot_path(&self) -> Option<&PathBuf> {
        self.snapshot_path.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the backend, then dehydrates if a snapshot path is set.
    ///
    /// Idempotent: only the first call does any work.
    pub async fn close(&self) -> LifecycleResult<DehydrationResult> {
        // AcqRel: exactly one caller observes `false` and performs the close.
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(DehydrationResult::Skipped {
                reason: "backend already closed".to_string(),
            });
        }

        self.backend.close().await;
        info!(backend = self.backend.name(), "Cache backend closed");

        match &self.snapshot_path {
            Some(path) => dehydrate(self.backend.as_ref(), path).await,
            None => Ok(DehydrationResult::Skipped {
                reason: "snapshot path not configured".to_string(),
            }),
        }
    }
}

impl Drop for BackendScope {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        warn!("Backend scope dropped without close; closing without snapshot");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let backend = Arc::clone(&self.backend);
            handle.spawn(async move { backend.close().await });
        }
    }
}

impl std::fmt::Debug for BackendScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendScope")
            .field("backend", &self.backend.name())
            .field("snapshot_path", &self.snapshot_path)
            .field("closed", &self.is_closed())
            .finish()
    }
}
