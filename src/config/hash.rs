//! Desired spec hashing for change detection.
//!
//! This module provides deterministic hashing of desired specs. The hash
//! is recorded on created resources and shown in plans so that drift can
//! be spotted at a glance.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::model::DesiredSpec;

/// Hasher for computing desired spec hashes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpecHasher;

impl SpecHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the hash of a resolved desired spec.
    ///
    /// Only provided fields participate; key order does not matter.
    #[must_use]
    pub fn hash_spec(&self, desired: &DesiredSpec) -> String {
        let value = serde_json::to_value(desired).unwrap_or(Value::Null);
        self.hash_value(&value)
    }

    /// Computes the hash of an arbitrary value in canonical form.
    #[must_use]
    pub fn hash_value(&self, value: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(canonicalize(value).to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 12 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(12).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Rebuilds a value with object keys sorted at every level.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let sorted: Map<String, Value> = keys
                .into_iter()
                .map(|k| (k.clone(), canonicalize(&map[k])))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_ignores_key_order() {
        let hasher = SpecHasher::new();
        let a = DesiredSpec::new()
            .with("image", json!("nginx"))
            .with("env", json!({"A": "1", "B": "2"}));
        let b = DesiredSpec::new()
            .with("env", json!({"B": "2", "A": "1"}))
            .with("image", json!("nginx"));
        assert_eq!(hasher.hash_spec(&a), hasher.hash_spec(&b));
    }

    #[test]
    fn test_unprovided_fields_do_not_change_hash() {
        let hasher = SpecHasher::new();
        let a = DesiredSpec::new().with("image", json!("nginx"));
        let b = a.clone().with_unset("ports");
        let c = a.clone().with_empty("ports");
        assert_eq!(hasher.hash_spec(&a), hasher.hash_spec(&b));
        assert_ne!(hasher.hash_spec(&a), hasher.hash_spec(&c));
    }

    #[test]
    fn test_short_hash() {
        let hasher = SpecHasher::new();
        let full = hasher.hash_value(&json!({"x": 1}));
        assert_eq!(full.len(), 64);
        assert_eq!(hasher.short_hash(&full).len(), 12);
    }

    #[test]
    fn test_hashes_match() {
        assert!(SpecHasher::hashes_match("abc123", "abc123"));
        assert!(!SpecHasher::hashes_match("abc123", "abc124"));
        assert!(!SpecHasher::hashes_match("abc123", "abc12"));
    }
}
