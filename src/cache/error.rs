use std::sync::Arc;

use thiserror::Error;

use crate::scoring::ScoringError;

/// Failure of the key-value store behind the dedup cache.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend was closed at shutdown; no further requests are served.
    #[error("cache backend is closed")]
    Closed,

    /// The store could not be reached or rejected the operation.
    #[error("cache backend unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Outcome error of [`DedupCache::get_or_compute`](super::DedupCache::get_or_compute).
///
/// `Clone` so a single failed flight can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The scoring computation failed. Never cached.
    #[error("scoring failed: {0}")]
    Scoring(#[source] Arc<ScoringError>),

    /// The backend failed for this request.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The computation task ended without producing an outcome.
    #[error("computation aborted before producing a result")]
    Aborted,
}

impl From<ScoringError> for CacheError {
    fn from(err: ScoringError) -> Self {
        CacheError::Scoring(Arc::new(err))
    }
}

impl CacheError {
    /// Returns `true` if this error came from the scorer.
    pub fn is_scoring(&self) -> bool {
        matches!(self, CacheError::Scoring(_))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
