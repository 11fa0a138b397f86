//! Content-addressed cache keys.
//!
//! A key is `"{namespace}:extract:{blake3 hex}"`, derived from the request's
//! declared `inputs` field. Validation runs first: an empty or whitespace-only
//! input never produces a key, so it can never reach the cache or the scorer.

use thiserror::Error;

use crate::constants::{DEFAULT_CACHE_NAMESPACE, DIGEST_HEX_LEN, EXTRACT_KEY_SEGMENT};
use crate::hashing::digest_hex;

/// Input rejected before any key derivation or cache interaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInputError {
    /// `inputs` was the empty string.
    #[error("inputs must not be empty")]
    Empty,

    /// `inputs` contained only whitespace.
    #[error("inputs must not be whitespace-only")]
    WhitespaceOnly,
}

/// Opaque, fixed-shape cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the trailing hex digest.
    pub fn digest(&self) -> &str {
        &self.0[self.0.len() - DIGEST_HEX_LEN..]
    }

    /// Rebuilds a key from its stored string form (used when restoring snapshots).
    ///
    /// Returns `None` unless the string ends in `:{64 hex chars}`.
    pub fn from_stored(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let (prefix, digest) = raw.rsplit_once(':')?;
        let well_formed = !prefix.is_empty()
            && digest.len() == DIGEST_HEX_LEN
            && digest.bytes().all(|b| b.is_ascii_hexdigit());
        well_formed.then_some(Self(raw))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Checks the non-empty / non-whitespace contract on `inputs`.
pub fn validate_inputs(inputs: &str) -> Result<(), InvalidInputError> {
    if inputs.is_empty() {
        return Err(InvalidInputError::Empty);
    }
    if inputs.trim().is_empty() {
        return Err(InvalidInputError::WhitespaceOnly);
    }
    Ok(())
}

/// Validates `inputs`, then derives its key under `namespace`.
///
/// The digest covers the untrimmed UTF-8 bytes: trimming only decides validity.
pub fn build_cache_key(namespace: &str, inputs: &str) -> Result<CacheKey, InvalidInputError> {
    validate_inputs(inputs)?;
    let digest = digest_hex(inputs.as_bytes());
    Ok(CacheKey(format!("{namespace}:{EXTRACT_KEY_SEGMENT}:{digest}")))
}

/// Key builder bound to one logical cache namespace.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    namespace: String,
}

impl KeyBuilder {
    /// Creates a builder for `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Returns the namespace this builder prefixes keys with.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Validates `inputs` and returns its key.
    #[inline]
    pub fn build(&self, inputs: &str) -> Result<CacheKey, InvalidInputError> {
        build_cache_key(&self.namespace, inputs)
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_NAMESPACE)
    }
}
