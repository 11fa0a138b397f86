//! Integration tests for input hashing and cache keys.

use std::collections::HashSet;

use grove::cache::{CacheKey, InvalidInputError, KeyBuilder, build_cache_key};
use grove::constants::{DEFAULT_CACHE_NAMESPACE, DIGEST_HEX_LEN};
use grove::hashing::{digest_hex, hash_inputs};

#[test]
fn test_key_is_namespace_operation_digest() {
    let key = build_cache_key("grove:test", "hello").unwrap();
    let expected = format!("grove:test:extract:{}", blake3::hash(b"hello").to_hex());
    assert_eq!(key.as_str(), expected);
    assert_eq!(key.digest().len(), DIGEST_HEX_LEN);
}

#[test]
fn test_key_is_stable_across_builders() {
    let a = KeyBuilder::default().build("The quick brown fox").unwrap();
    let b = KeyBuilder::new(DEFAULT_CACHE_NAMESPACE)
        .build("The quick brown fox")
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_distinct_inputs_give_distinct_keys() {
    let inputs = ["hello", "Hello", "hello ", " hello", "hello\n", "héllo"];
    let keys: HashSet<CacheKey> = inputs
        .iter()
        .map(|i| build_cache_key("ns", i).unwrap())
        .collect();
    assert_eq!(keys.len(), inputs.len());
}

#[test]
fn test_namespace_separates_keys() {
    let a = build_cache_key("one", "same").unwrap();
    let b = build_cache_key("two", "same").unwrap();
    assert_ne!(a, b);
    assert_eq!(a.digest(), b.digest());
}

#[test]
fn test_blank_inputs_never_produce_keys() {
    assert_eq!(build_cache_key("ns", ""), Err(InvalidInputError::Empty));
    assert_eq!(
        build_cache_key("ns", " \t\n"),
        Err(InvalidInputError::WhitespaceOnly)
    );
    assert!(build_cache_key("ns", "a").is_ok());
}

#[test]
fn test_stored_key_roundtrip() {
    let key = build_cache_key("grove:test", "hello").unwrap();
    let restored = CacheKey::from_stored(key.as_str()).unwrap();
    assert_eq!(restored, key);
    assert!(CacheKey::from_stored("grove:test:extract:xyz").is_none());
}

#[test]
fn test_digest_helpers_agree() {
    let raw_hex: String = hash_inputs("hello")
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    assert_eq!(digest_hex(b"hello"), raw_hex);
}
