//! Grove variability library crate (used by the server and integration tests).
//!
//! Scores how much a model's internal representation of an input changes
//! between its first and last hidden layers, behind a content-addressed cache
//! that computes each distinct input at most once at a time.
//!
//! ## Modules
//! - [`cache`]: cache keys, the [`CacheBackend`] seam and the single-flight [`DedupCache`]
//! - [`scoring`]: Jensen–Shannon divergence and the [`DivergenceScorer`] trait
//! - [`model`]: GGUF decoder returning hidden states (stub mode for tests)
//! - [`lifecycle`]: snapshot persistence and the close-once [`BackendScope`]
//! - [`gateway`]: Axum router for the extraction endpoint
//!
//! ## Test/Mock Support
//! Mock implementations are available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod cache;
pub mod config;
pub mod constants;
pub mod gateway;
pub mod hashing;
pub mod lifecycle;
pub mod model;
pub mod scoring;

pub use cache::{
    BackendError, CacheBackend, CacheEntry, CacheError, CacheKey, CacheResult, CacheStatus,
    DedupCache, DedupStats, InvalidInputError, KeyBuilder, Lookup, MemoryBackend,
    build_cache_key, validate_inputs,
};
#[cfg(any(test, feature = "mock"))]
pub use cache::FailingBackend;
pub use config::{Config, ConfigError};
pub use gateway::{ApiResponse, GatewayError, HandlerState, ScoreData, ScoreRequest, create_router};
pub use hashing::{digest_hex, hash_inputs};
pub use lifecycle::{BackendScope, DehydrationResult, HydrationResult, LifecycleError};
pub use model::{HiddenStateModel, HiddenStatePair, ModelConfig, ModelError};
#[cfg(any(test, feature = "mock"))]
pub use scoring::MockScorer;
pub use scoring::{
    DivergenceScorer, ScorerMode, ScoringError, VariabilityScorer, jensen_shannon_divergence,
};
