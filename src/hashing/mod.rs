//! BLAKE3 helpers for content-addressed cache keys.

/// Returns the full 32-byte BLAKE3 digest of the UTF-8 bytes of `inputs`.
#[inline]
pub fn hash_inputs(inputs: &str) -> [u8; 32] {
    *blake3::hash(inputs.as_bytes()).as_bytes()
}

/// Returns the lowercase hex BLAKE3 digest of `data` (64 characters).
///
/// BLAKE3 output is fixed by the algorithm, so the same bytes map to the same
/// string on every platform and across process restarts.
#[inline]
pub fn digest_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Computes a 64-bit value from the first 8 bytes of the BLAKE3 digest.
///
/// Only used where a compact seed is needed (the stub scorer). Cache keys always
/// use the full 256-bit digest from [`digest_hex`].
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}
