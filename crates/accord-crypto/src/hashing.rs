//! SHA-256 helpers over raw bytes and canonical value trees.

use accord_types::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes.
#[must_use]
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// SHA-256 of a value tree's canonical byte form.
///
/// # Errors
/// Propagates [`accord_types::AccordError::Canonicalization`] for trees
/// containing floats or other disallowed types.
pub fn hash_canonical(value: &Value) -> Result<[u8; 32]> {
    Ok(sha256(&accord_types::canon::to_canonical_bytes(value)?))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hash_canonical_is_key_order_independent() {
        let a = hash_canonical(&json!({"x": 1, "y": 2})).unwrap();
        let b = hash_canonical(&json!({"y": 2, "x": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hash_canonical_rejects_floats() {
        assert!(hash_canonical(&json!({"f": 1.5})).is_err());
    }
}
