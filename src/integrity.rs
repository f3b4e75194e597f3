//! Payload integrity verification.
//!
//! A digest is always computed over the canonical serialized form of a
//! payload, so a digest written at backup time can be recomputed byte-for-
//! byte at restore time. `serde_json` keeps object keys sorted, which makes
//! the serialization stable across processes.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of a payload's canonical serialization,
/// as a lowercase hex string.
pub fn digest(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Recompute the digest of `payload` and compare against `expected`.
///
/// A mismatch is a hard "do not trust" signal to the caller, never an
/// error: callers skip the payload and move on to the next candidate.
pub fn verify(payload: &Value, expected: &str) -> bool {
    digest(payload) == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_digest_is_stable() {
        let payload = json!({"b": 2, "a": 1});
        assert_eq!(digest(&payload), digest(&payload));
        // Key order in the literal must not matter.
        assert_eq!(digest(&payload), digest(&json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        let d = digest(&json!("payload"));
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_round_trip() {
        let payload = json!({"session": "abc", "keys": [1, 2, 3]});
        let d = digest(&payload);
        assert!(verify(&payload, &d));
    }

    #[test]
    fn test_verify_rejects_mismatch() {
        let payload = json!({"session": "abc"});
        assert!(!verify(&payload, "deadbeef"));
        assert!(!verify(&json!({"session": "abd"}), &digest(&payload)));
    }
}
