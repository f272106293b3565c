//! Canonical JSON serialization for hashing.
//!
//! The hashed form must be stable across implementations: object keys are
//! sorted lexicographically at every level, independent of the map backend
//! the JSON value was built with.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Rebuilds `value` with every object's keys in sorted order, recursively.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, val) in entries {
                sorted.insert(key.clone(), canonicalize(val));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical byte form of `value`.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&canonicalize(value))
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_the_digest() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"z": true, "y": [2, {"q": 0}]}}"#)
            .unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"y": [2, {"q": 0}], "z": true}, "b": 1}"#)
            .unwrap();
        assert_eq!(
            sha256_hex(&canonical_bytes(&a).unwrap()),
            sha256_hex(&canonical_bytes(&b).unwrap())
        );
    }

    #[test]
    fn differing_values_change_the_digest() {
        let a = json!({"x": 1});
        let b = json!({"x": 2});
        assert_ne!(
            sha256_hex(&canonical_bytes(&a).unwrap()),
            sha256_hex(&canonical_bytes(&b).unwrap())
        );
    }

    #[test]
    fn digest_is_64_lowercase_hex_chars() {
        let digest = sha256_hex(b"");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
