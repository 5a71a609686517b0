//! One-way token hashing.
//!
//! Plaintext access and refresh tokens are never persisted; session rows
//! store the SHA-256 hex digest and lookups hash the presented token first.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of a bearer or refresh token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_hex() {
        let a = hash_token("refresh-abc");
        assert_eq!(a, hash_token("refresh-abc"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_tokens_hash_differently() {
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            hash_token(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
