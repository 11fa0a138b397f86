use std::path::PathBuf;

use crate::constants::{DEFAULT_MAX_SEQ_LEN, STUB_HIDDEN_DIM};
use crate::model::error::ModelError;

#[derive(Debug, Clone)]
/// Configuration for [`HiddenStateModel`](super::HiddenStateModel).
pub struct ModelConfig {
    /// Path to the GGUF model file.
    pub model_path: PathBuf,
    /// Path to `tokenizer.json`.
    pub tokenizer_path: PathBuf,
    /// Max tokens fed to the model; longer inputs are truncated.
    pub max_seq_len: usize,
    /// Hidden size of the stub backend.
    pub stub_hidden_dim: usize,
    /// If true, run in deterministic stub mode (no model files required).
    pub testing_stub: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            tokenizer_path: PathBuf::new(),
            max_seq_len: DEFAULT_MAX_SEQ_LEN,
            stub_hidden_dim: STUB_HIDDEN_DIM,
            testing_stub: false,
        }
    }
}

impl ModelConfig {
    /// Creates a config for a model file, inferring `tokenizer.json` from its directory.
    pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
        let model_path = model_path.into();
        let tokenizer_path = model_path
            .parent()
            .map(|p| p.join("tokenizer.json"))
            .unwrap_or_default();

        Self {
            model_path,
            tokenizer_path,
            ..Default::default()
        }
    }

    /// Creates a stub config (no model files; produces deterministic hidden states).
    pub fn stub() -> Self {
        Self {
            testing_stub: true,
            ..Default::default()
        }
    }

    /// Builds the model config from server settings; no model path means stub mode.
    pub fn from_server_config(config: &crate::config::Config) -> Self {
        let mut model = match &config.model_path {
            Some(path) => Self::new(path.clone()),
            None => Self::stub(),
        };
        if let Some(tokenizer) = &config.tokenizer_path {
            model.tokenizer_path = tokenizer.clone();
        }
        model.max_seq_len = config.max_seq_len;
        model
    }

    /// Validates required fields for non-stub mode.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.max_seq_len == 0 {
            return Err(ModelError::InvalidConfig {
                reason: "max_seq_len must be at least 1".to_string(),
            });
        }

        if self.testing_stub {
            if self.stub_hidden_dim == 0 {
                return Err(ModelError::InvalidConfig {
                    reason: "stub_hidden_dim must be at least 1".to_string(),
                });
            }
            return Ok(());
        }

        if self.model_path.as_os_str().is_empty() {
            return Err(ModelError::InvalidConfig {
                reason: "model_path is required (stubbing is disabled)".to_string(),
            });
        }

        if !self.model_path.exists() {
            return Err(ModelError::ModelNotFound {
                path: self.model_path.clone(),
            });
        }

        Ok(())
    }

    /// Returns `true` if the model file path exists.
    pub fn model_available(&self) -> bool {
        !self.model_path.as_os_str().is_empty() && self.model_path.exists()
    }

    /// Returns `true` if the tokenizer path exists.
    pub fn tokenizer_available(&self) -> bool {
        !self.tokenizer_path.as_os_str().is_empty() && self.tokenizer_path.exists()
    }
}
