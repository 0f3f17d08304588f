//! Content Fingerprinting
//!
//! A message's fingerprint is the stable hash of its type name and canonical
//! JSON payload. It serves as both the cache key and the response-correlation
//! key, so it must be identical for identical content across processes.
//! `serde_json` keeps object keys sorted in its default `Value`
//! representation, which makes the serialized form canonical.

use sha2::{Digest, Sha256};

/// Computes the stable content fingerprint of a message.
pub fn fingerprint(message_type: &str, payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        let payload = serde_json::json!({"b": 2, "a": 1});

        let f1 = fingerprint("order.create", &payload);
        let f2 = fingerprint("order.create", &payload);
        assert_eq!(f1, f2);
    }

    #[test]
    fn test_fingerprint_ignores_key_ordering_in_source() {
        // serde_json::Value sorts object keys, so payloads built in any
        // insertion order hash identically.
        let left: serde_json::Value = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
        let right: serde_json::Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();

        assert_eq!(
            fingerprint("order.create", &left),
            fingerprint("order.create", &right)
        );
    }

    #[test]
    fn test_fingerprint_varies_with_type_and_payload() {
        let payload = serde_json::json!({"a": 1});

        assert_ne!(
            fingerprint("order.create", &payload),
            fingerprint("order.cancel", &payload)
        );
        assert_ne!(
            fingerprint("order.create", &payload),
            fingerprint("order.create", &serde_json::json!({"a": 2}))
        );
    }
}
