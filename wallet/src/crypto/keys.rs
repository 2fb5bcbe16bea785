//! # Account Keys
//!
//! Ed25519 account keys and the [`AccountKeyProvider`] capability the wallet
//! uses to resolve an account index into a public key, its hash and a
//! signing capability.
//!
//! Key *storage* (encryption at rest, mnemonic derivation) is somebody
//! else's problem; the wallet only ever asks "give me account `n`". The
//! [`KeyRing`] here is a plain in-memory provider, good for tests and for
//! embedding behind a real keystore.
//!
//! Key bytes are never logged. If you add logging to this module, don't.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::hash::sha256;

/// Length of an Ed25519 signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of an Ed25519 public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// SHA-256 of a public key. This is what a P2PKH predicate commits to.
pub type PubKeyHash = [u8; 32];

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes")]
    InvalidPublicKey,

    /// The provider has no key at this (zero-based) index.
    #[error("no account key at index {0}")]
    UnknownAccount(u64),
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// The public half of an account key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_LENGTH],
}

impl PublicKey {
    /// Create a `PublicKey` from raw bytes.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Parse and validate a public key from a byte slice.
    ///
    /// Rejects slices of the wrong length and byte strings that are not a
    /// valid Ed25519 point.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Parse a hex-encoded public key (with or without a `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.bytes
    }

    /// SHA-256 of the key bytes.
    pub fn key_hash(&self) -> PubKeyHash {
        sha256(&self.bytes)
    }

    /// Verify a signature produced by the matching [`AccountKey`].
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&sig_bytes);
        verifying_key.verify(message, &sig).is_ok()
    }

    /// Hex-encoded representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// AccountKey
// ---------------------------------------------------------------------------

/// An account's Ed25519 signing key.
///
/// Deliberately not `Serialize`: exporting a secret should be an explicit
/// call to [`AccountKey::secret_key_bytes`], never a side effect of
/// shoving a struct into JSON.
pub struct AccountKey {
    signing_key: SigningKey,
}

impl AccountKey {
    /// Generate a fresh key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic key from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Load a key from a hex-encoded 32-byte secret.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// The account's public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    /// SHA-256 of the account's public key.
    pub fn pub_key_hash(&self) -> PubKeyHash {
        self.public_key().key_hash()
    }

    /// Sign a message. Ed25519 signatures are deterministic.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Export the raw 32-byte secret. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl Clone for AccountKey {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountKey(pub={})", self.public_key().to_hex())
    }
}

impl PartialEq for AccountKey {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for AccountKey {}

// ---------------------------------------------------------------------------
// AccountKeyProvider
// ---------------------------------------------------------------------------

/// Resolves a zero-based account index into its key.
///
/// User-facing account numbers are one-based (`ptpkh:1` is the first
/// account); conversion happens at the predicate parsing boundary.
pub trait AccountKeyProvider: Send + Sync {
    /// Key of the account at `index` (zero-based).
    fn account_key(&self, index: u64) -> Result<AccountKey, KeyError>;

    /// Number of accounts the provider knows about.
    fn account_count(&self) -> u64;
}

/// In-memory [`AccountKeyProvider`].
#[derive(Debug, Default)]
pub struct KeyRing {
    keys: RwLock<Vec<AccountKey>>,
}

impl KeyRing {
    /// Creates an empty key ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a key ring with one account per seed, in order.
    pub fn from_seeds(seeds: &[[u8; 32]]) -> Self {
        Self {
            keys: RwLock::new(seeds.iter().map(AccountKey::from_seed).collect()),
        }
    }

    /// Appends an account and returns its zero-based index.
    pub fn add_account(&self, key: AccountKey) -> u64 {
        let mut keys = self.keys.write();
        keys.push(key);
        (keys.len() - 1) as u64
    }

    /// Appends a freshly generated account and returns its zero-based index.
    pub fn generate_account(&self) -> u64 {
        self.add_account(AccountKey::generate())
    }
}

impl AccountKeyProvider for KeyRing {
    fn account_key(&self, index: u64) -> Result<AccountKey, KeyError> {
        let keys = self.keys.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| keys.get(i))
            .cloned()
            .ok_or(KeyError::UnknownAccount(index))
    }

    fn account_count(&self) -> u64 {
        self.keys.read().len() as u64
    }
}
