//! Content-addressed score cache with single-flight computation.

pub mod backend;
pub mod dedup;
pub mod error;
pub mod key;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use backend::{CacheBackend, MemoryBackend};
pub use dedup::{DedupCache, DedupStats};
pub use error::{BackendError, CacheError, CacheResult};
pub use key::{CacheKey, InvalidInputError, KeyBuilder, build_cache_key, validate_inputs};
#[cfg(any(test, feature = "mock"))]
pub use mock::FailingBackend;
pub use types::{
    CacheEntry, CacheStatus, GROVE_CACHE_HEADER, GROVE_STATUS_CLOSED, GROVE_STATUS_NOT_READY,
    GROVE_STATUS_READY, Lookup,
};
