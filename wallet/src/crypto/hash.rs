//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **SHA-256** is what the partition speaks. Public key hashes inside
//!   P2PKH predicates, transaction hashes and fee credit record IDs are all
//!   SHA-256, because validators compute them too and we must agree on every
//!   byte.
//!
//! - **BLAKE3** is for wallet-internal derivations: deterministic unit IDs
//!   for split outputs and the keys of the owner index in [`crate::storage`].

use sha2::{Digest, Sha256};

/// Context string for split-output unit ID derivation.
pub const SPLIT_UNIT_ID_CONTEXT: &str = "token-wallet 2026 split unit id";

/// Compute the SHA-256 hash of the input data as a fixed-size array.
///
/// # Example
///
/// ```
/// use token_wallet::crypto::sha256;
///
/// let hash = sha256(b"tokens partition");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Compute a domain-separated hash using BLAKE3's `derive_key` mode.
///
/// Used wherever the same input bytes could otherwise collide across two
/// derivations (e.g. a split output ID vs. an owner index key).
pub fn domain_separated_hash(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let hash = sha256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(hash.as_slice(), expected.as_slice());
    }

    #[test]
    fn domain_separation_changes_digest() {
        let a = domain_separated_hash("context-a", &[b"same data"]);
        let b = domain_separated_hash("context-b", &[b"same data"]);
        assert_ne!(a, b);
        assert_ne!(a, blake3_hash(b"same data"));
    }
}
