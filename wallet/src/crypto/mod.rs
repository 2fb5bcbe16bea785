//! # Cryptographic Primitives
//!
//! Thin, type-safe wrappers around audited implementations:
//!
//! - **Ed25519** (`ed25519-dalek`) for account keys and P2PKH proofs.
//! - **SHA-256** for everything the partition hashes (public key hashes,
//!   transaction hashes, fee credit record IDs).
//! - **BLAKE3** for wallet-side derivations.

pub mod hash;
pub mod keys;

pub use hash::{blake3_hash, domain_separated_hash, sha256};
pub use keys::{AccountKey, AccountKeyProvider, KeyError, KeyRing, PubKeyHash, PublicKey};
