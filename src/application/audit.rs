//! Audit fingerprints of apportionment outcomes
//!
//! A fingerprint is the SHA-256 of the outcome's canonical JSON. Identical
//! input, lot decisions included, yields the identical fingerprint.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::application::{ApplicationError, ApplicationResult};

/// Compute the hex encoded SHA-256 of `content`.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Fingerprint of any serializable outcome.
///
/// # Returns
/// 64-character lowercase hex string
pub fn fingerprint<T: Serialize>(outcome: &T) -> ApplicationResult<String> {
    let canonical = serde_json::to_vec(outcome).map_err(|e| ApplicationError::OperationFailed {
        context: "serialize outcome for fingerprint".to_string(),
        source: Box::new(e),
    })?;
    Ok(content_hash(&canonical))
}

/// Short form for terminal output (first 32 bits).
pub fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint.get(..8).unwrap_or(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_same_content_when_hashing_then_same_hash() {
        let a = content_hash(b"mandates");
        assert_eq!(a, content_hash(b"mandates"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash(b"mandate"));
    }

    #[test]
    fn given_value_when_fingerprinting_then_short_form_is_prefix() {
        let fp = fingerprint(&vec![1, 2, 3]).unwrap();
        assert_eq!(short_fingerprint(&fp), &fp[..8]);
        assert_eq!(short_fingerprint("abc"), "abc");
    }
}
