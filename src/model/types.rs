use candle_core::Tensor;

use super::error::ModelError;

/// First-layer and last-layer hidden states for one input, each `[seq_len, hidden]`.
///
/// Both tensors always share a non-empty shape.
#[derive(Debug, Clone)]
pub struct HiddenStatePair {
    first: Tensor,
    last: Tensor,
}

impl HiddenStatePair {
    /// Pairs two hidden-state tensors, rejecting mismatched or empty shapes.
    pub fn new(first: Tensor, last: Tensor) -> Result<Self, ModelError> {
        if first.dims() != last.dims() {
            return Err(ModelError::InferenceFailed {
                reason: format!(
                    "hidden state shapes differ: {:?} vs {:?}",
                    first.dims(),
                    last.dims()
                ),
            });
        }
        if first.rank() != 2 || first.elem_count() == 0 {
            return Err(ModelError::InferenceFailed {
                reason: format!("expected non-empty [seq, hidden], got {:?}", first.dims()),
            });
        }
        Ok(Self { first, last })
    }

    pub fn first(&self) -> &Tensor {
        &self.first
    }

    pub fn last(&self) -> &Tensor {
        &self.last
    }

    pub fn seq_len(&self) -> usize {
        self.first.dims()[0]
    }

    pub fn hidden_dim(&self) -> usize {
        self.first.dims()[1]
    }
}
