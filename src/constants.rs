//! Cross-cutting, shared constants.
//!
//! Prefer deriving secondary constants from primary ones to avoid drift.

/// Default key namespace for the variability cache.
pub const DEFAULT_CACHE_NAMESPACE: &str = "grove:model-centric:variability";

/// Operation segment placed between the namespace and the digest.
pub const EXTRACT_KEY_SEGMENT: &str = "extract";

/// Length of a hex-encoded BLAKE3-256 digest.
pub const DIGEST_HEX_LEN: usize = blake3::OUT_LEN * 2;

/// Default token budget per scored input.
pub const DEFAULT_MAX_SEQ_LEN: usize = 2048;

/// Stabilising epsilon added before every logarithm in the divergence.
pub const DIVERGENCE_EPSILON: f64 = 1e-8;

/// Hidden size used by the stub scorer backend.
pub const STUB_HIDDEN_DIM: usize = 64;

/// Upper bound on stub sequence length (one row per whitespace token).
pub const STUB_MAX_SEQ_LEN: usize = 128;

/// HTTP route of the extraction endpoint.
pub const EXTRACT_ROUTE: &str = "/v1/model-centric/variability/extract";
