//! Jensen–Shannon divergence between two hidden-state tensors.
//!
//! Each tensor is turned into per-position distributions with a softmax over the
//! feature (last) axis. The KL terms are summed over every element, so the score
//! grows with sequence length rather than being a per-position mean.

use candle_core::{DType, Tensor};
use candle_nn::ops::softmax;

use super::error::ScoringError;
use crate::constants::DIVERGENCE_EPSILON;

/// `KL(p || q)` summed over all elements, with `epsilon` added to both sides
/// before the logarithm.
pub fn kl_divergence(p: &Tensor, q: &Tensor, epsilon: f64) -> Result<f64, ScoringError> {
    let p = (p + epsilon)?;
    let q = (q + epsilon)?;
    let log_ratio = (p.log()? - q.log()?)?;
    let kl = (p * log_ratio)?.sum_all()?.to_scalar::<f64>()?;
    Ok(kl)
}

/// JSD of the feature-axis softmax of `first` and `last`.
///
/// Both tensors must share a non-empty shape. The result is finite and
/// non-negative; tiny negative values from rounding are clamped to zero.
pub fn jensen_shannon_divergence(first: &Tensor, last: &Tensor) -> Result<f64, ScoringError> {
    if first.dims() != last.dims() {
        return Err(ScoringError::DegenerateInput {
            reason: format!("shape mismatch: {:?} vs {:?}", first.dims(), last.dims()),
        });
    }
    if first.rank() == 0 || first.elem_count() == 0 {
        return Err(ScoringError::DegenerateInput {
            reason: format!("empty hidden states: {:?}", first.dims()),
        });
    }

    let axis = first.rank() - 1;
    let p1 = softmax(&first.to_dtype(DType::F64)?, axis)?;
    let p2 = softmax(&last.to_dtype(DType::F64)?, axis)?;
    let mid = ((&p1 + &p2)? * 0.5)?;

    let kl1 = kl_divergence(&p1, &mid, DIVERGENCE_EPSILON)?;
    let kl2 = kl_divergence(&p2, &mid, DIVERGENCE_EPSILON)?;
    let js = 0.5 * (kl1 + kl2);

    if !js.is_finite() {
        return Err(ScoringError::ComputationFailed {
            reason: format!("divergence is not finite ({js})"),
        });
    }

    Ok(js.max(0.0))
}
