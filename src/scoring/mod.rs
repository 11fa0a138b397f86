//! Variability scoring: hidden states in, Jensen–Shannon divergence out.

pub mod divergence;
pub mod error;
pub mod scorer;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use divergence::{jensen_shannon_divergence, kl_divergence};
pub use error::ScoringError;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockScorer;
pub use scorer::{DivergenceScorer, VariabilityScorer, score_blocking};
pub use types::ScorerMode;
