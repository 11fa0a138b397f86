use std::sync::Arc;

use tracing::{debug, info};

use crate::model::{HiddenStateModel, ModelConfig};

use super::divergence::jensen_shannon_divergence;
use super::error::ScoringError;
use super::types::ScorerMode;

/// Maps an input string to a variability score.
///
/// Implementations are synchronous and may be CPU-heavy; async callers go
/// through [`score_blocking`].
pub trait DivergenceScorer: Send + Sync {
    fn score(&self, inputs: &str) -> Result<f64, ScoringError>;

    fn mode(&self) -> ScorerMode;
}

/// Scores inputs by the divergence between first- and last-layer hidden states.
pub struct VariabilityScorer {
    model: HiddenStateModel,
}

impl std::fmt::Debug for VariabilityScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariabilityScorer")
            .field("model", &self.model)
            .finish()
    }
}

impl VariabilityScorer {
    pub fn new(config: ModelConfig) -> Result<Self, ScoringError> {
        let model = HiddenStateModel::load(config)?;
        info!(stub = model.is_stub(), "Variability scorer ready");
        Ok(Self { model })
    }

    pub fn stub() -> Result<Self, ScoringError> {
        Self::new(ModelConfig::stub())
    }

    pub fn is_model_loaded(&self) -> bool {
        !self.model.is_stub()
    }
}

impl DivergenceScorer for VariabilityScorer {
    fn score(&self, inputs: &str) -> Result<f64, ScoringError> {
        if inputs.trim().is_empty() {
            return Err(ScoringError::InvalidInput {
                reason: "inputs must not be empty or whitespace-only".to_string(),
            });
        }

        let pair = self.model.hidden_states(inputs)?;
        let score = jensen_shannon_divergence(pair.first(), pair.last())?;

        debug!(
            seq_len = pair.seq_len(),
            hidden_dim = pair.hidden_dim(),
            score,
            "Computed variability score"
        );
        Ok(score)
    }

    fn mode(&self) -> ScorerMode {
        if self.model.is_stub() {
            ScorerMode::Stub
        } else {
            ScorerMode::Model
        }
    }
}

/// Runs `scorer` on the blocking pool so inference never stalls the runtime.
pub async fn score_blocking(
    scorer: Arc<dyn DivergenceScorer>,
    inputs: String,
) -> Result<f64, ScoringError> {
    tokio::task::spawn_blocking(move || scorer.score(&inputs))
        .await
        .map_err(|e| ScoringError::ComputationFailed {
            reason: format!("scoring task failed: {e}"),
        })?
}
