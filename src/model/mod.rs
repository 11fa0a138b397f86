//! Hidden-state extraction (GGUF decoder + tokenizer).
//!
//! Use [`ModelConfig::stub`] for tests and local runs without model files.

/// Model configuration.
pub mod config;
/// Device selection (CPU / Metal / CUDA).
pub mod device;
mod error;
pub(crate) mod transformer;
mod types;
/// Tokenizer loading helpers.
pub mod utils;


pub use config::ModelConfig;
pub use error::ModelError;
pub use types::HiddenStatePair;

use std::sync::Arc;

use candle_core::{Device, Tensor};
use tracing::{debug, info, warn};

use crate::constants::STUB_MAX_SEQ_LEN;
use crate::hashing::hash_to_u64;

use device::select_device;
use transformer::DecoderForHiddenStates;
use utils::load_tokenizer;

enum ModelBackend {
    Model {
        model: Arc<DecoderForHiddenStates>,
        tokenizer: Arc<tokenizers::Tokenizer>,
        device: Device,
    },
    Stub {
        device: Device,
    },
}

/// Produces first- and last-layer hidden states for a text input.
pub struct HiddenStateModel {
    backend: ModelBackend,
    config: ModelConfig,
}

impl std::fmt::Debug for HiddenStateModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiddenStateModel")
            .field(
                "backend",
                &match &self.backend {
                    ModelBackend::Model { device, .. } => format!("Model({:?})", device),
                    ModelBackend::Stub { device } => format!("Stub({:?})", device),
                },
            )
            .field("max_seq_len", &self.config.max_seq_len)
            .finish()
    }
}

impl HiddenStateModel {
    /// Loads the model from a config (stub mode is supported).
    pub fn load(config: ModelConfig) -> Result<Self, ModelError> {
        config.validate()?;

        let device = select_device()?;
        debug!(?device, "Selected compute device");

        if config.testing_stub {
            warn!("Hidden-state model running in STUB mode (deterministic synthetic tensors)");
            return Ok(Self {
                backend: ModelBackend::Stub { device },
                config,
            });
        }

        if !config.model_available() || !config.tokenizer_available() {
            return Err(ModelError::ModelNotFound {
                path: if config.model_available() {
                    config.tokenizer_path.clone()
                } else {
                    config.model_path.clone()
                },
            });
        }

        let (model, tokenizer) = Self::load_model(&config, &device)?;

        info!(
            model_path = %config.model_path.display(),
            architecture = %model.config().architecture,
            hidden_size = model.config().hidden_size,
            num_layers = model.config().num_layers,
            max_positions = model.max_positions(),
            "Hidden-state model loaded"
        );

        Ok(Self {
            backend: ModelBackend::Model {
                model: Arc::new(model),
                tokenizer: Arc::new(tokenizer),
                device,
            },
            config,
        })
    }

    fn load_model(
        config: &ModelConfig,
        device: &Device,
    ) -> Result<(DecoderForHiddenStates, tokenizers::Tokenizer), ModelError> {
        let tokenizer =
            load_tokenizer(&config.tokenizer_path).map_err(|e| ModelError::TokenizationFailed {
                reason: format!("Failed to load tokenizer: {}", e),
            })?;

        let mut model_file = std::fs::File::open(&config.model_path)?;
        let content = candle_core::quantized::gguf_file::Content::read(&mut model_file).map_err(
            |e| ModelError::ModelLoadFailed {
                reason: format!("Failed to read GGUF content: {}", e),
            },
        )?;

        let model =
            DecoderForHiddenStates::from_gguf(content, &mut model_file, device, config.max_seq_len)
                .map_err(|e| ModelError::ModelLoadFailed {
                    reason: format!("Failed to load decoder: {}", e),
                })?;

        Ok((model, tokenizer))
    }

    /// Returns the embedding-layer and final-layer hidden states for `text`.
    pub fn hidden_states(&self, text: &str) -> Result<HiddenStatePair, ModelError> {
        match &self.backend {
            ModelBackend::Model {
                model,
                tokenizer,
                device,
            } => self.hidden_states_with_model(text, model, tokenizer, device),
            ModelBackend::Stub { device } => self.hidden_states_stub(text, device),
        }
    }

    fn hidden_states_with_model(
        &self,
        text: &str,
        model: &DecoderForHiddenStates,
        tokenizer: &tokenizers::Tokenizer,
        device: &Device,
    ) -> Result<HiddenStatePair, ModelError> {
        let encoding =
            tokenizer
                .encode(text, true)
                .map_err(|e| ModelError::TokenizationFailed {
                    reason: e.to_string(),
                })?;

        let mut tokens: Vec<u32> = encoding.get_ids().to_vec();
        if tokens.is_empty() {
            return Err(ModelError::TokenizationFailed {
                reason: "input produced no tokens".to_string(),
            });
        }

        let limit = self.config.max_seq_len.min(model.max_positions());
        if tokens.len() > limit {
            debug!(token_count = tokens.len(), limit, "Truncating input");
            tokens.truncate(limit);
        }

        debug!(
            text_len = text.len(),
            token_count = tokens.len(),
            "Extracting hidden states (transformer forward pass)"
        );

        let input_ids = Tensor::new(&tokens[..], device)?.unsqueeze(0)?;
        let (first, last) =
            model
                .forward_hidden_pair(&input_ids)
                .map_err(|e| ModelError::InferenceFailed {
                    reason: format!("Transformer forward pass failed: {}", e),
                })?;
        drop(model);

        HiddenStatePair::new(first.squeeze(0)?, last.squeeze(0)?)
    }

    /// Deterministic synthetic states: one row per whitespace token, values
    /// seeded from the text, and a last layer that differs from the first.
    fn hidden_states_stub(&self, text: &str, device: &Device) -> Result<HiddenStatePair, ModelError> {
        let seq_len = text
            .split_whitespace()
            .count()
            .clamp(1, STUB_MAX_SEQ_LEN.min(self.config.max_seq_len));
        let dim = self.config.stub_hidden_dim;

        debug!(text_len = text.len(), seq_len, "Generating stub hidden states");

        let mut state = hash_to_u64(text.as_bytes());
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((state >> 32) as f32 / u32::MAX as f32) * 2.0 - 1.0
        };

        let first: Vec<f32> = (0..seq_len * dim).map(|_| next()).collect();
        let last: Vec<f32> = first.iter().map(|x| x * 2.0 + next()).collect();

        HiddenStatePair::new(
            Tensor::from_vec(first, (seq_len, dim), device)?,
            Tensor::from_vec(last, (seq_len, dim), device)?,
        )
    }

    /// Returns `true` if running in stub mode.
    pub fn is_stub(&self) -> bool {
        matches!(self.backend, ModelBackend::Stub { .. })
    }

    /// Returns the model configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}
