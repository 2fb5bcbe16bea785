//! Tagged unit identifiers.
//!
//! Every addressable record on the tokens partition (token types, tokens,
//! fee credit records) is identified by a 33-byte [`UnitId`]: a 32-byte body
//! followed by a single *type tag* byte that says what class of unit it is.
//! The tag is checked everywhere a unit ID crosses an API boundary, so a
//! token ID can never be mistaken for a type ID.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::crypto::hash::{domain_separated_hash, SPLIT_UNIT_ID_CONTEXT};
use crate::crypto::keys::PublicKey;

/// Length of a unit ID body (without the tag).
pub const UNIT_ID_BODY_LENGTH: usize = 32;

/// Full length of a unit ID (body + tag).
pub const UNIT_ID_LENGTH: usize = UNIT_ID_BODY_LENGTH + 1;

/// Tag of fungible token type units.
pub const FUNGIBLE_TOKEN_TYPE_TAG: u8 = 0x20;
/// Tag of fungible token units.
pub const FUNGIBLE_TOKEN_TAG: u8 = 0x21;
/// Tag of non-fungible token type units.
pub const NFT_TYPE_TAG: u8 = 0x22;
/// Tag of non-fungible token units.
pub const NFT_TAG: u8 = 0x23;
/// Tag of fee credit record units.
pub const FEE_CREDIT_RECORD_TAG: u8 = 0x2f;

/// Errors produced when parsing unit IDs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitIdError {
    #[error("invalid unit id length: expected 33 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid unit id hex: {0}")]
    InvalidHex(String),
}

/// A 33-byte tagged unit identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(Vec<u8>);

/// ID of a token type unit.
pub type TypeId = UnitId;

/// ID of a token unit.
pub type TokenId = UnitId;

impl UnitId {
    /// Builds an ID from a body and a tag.
    pub fn new(body: [u8; UNIT_ID_BODY_LENGTH], tag: u8) -> Self {
        let mut bytes = Vec::with_capacity(UNIT_ID_LENGTH);
        bytes.extend_from_slice(&body);
        bytes.push(tag);
        Self(bytes)
    }

    /// A fresh random ID with the given tag.
    pub fn random(tag: u8) -> Self {
        let mut body = [0u8; UNIT_ID_BODY_LENGTH];
        rand::thread_rng().fill_bytes(&mut body);
        Self::new(body, tag)
    }

    /// Parses raw bytes, checking only the length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UnitIdError> {
        if bytes.len() != UNIT_ID_LENGTH {
            return Err(UnitIdError::InvalidLength(bytes.len()));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Parses a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, UnitIdError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| UnitIdError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Raw ID bytes (body + tag).
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The type tag (last byte). Zero for a malformed (empty) ID.
    pub fn tag(&self) -> u8 {
        self.0.last().copied().unwrap_or_default()
    }

    /// Returns `true` if this ID carries the given tag.
    pub fn has_tag(&self, tag: u8) -> bool {
        self.0.len() == UNIT_ID_LENGTH && self.tag() == tag
    }

    /// Hex-encoded representation (no prefix).
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() > 16 {
            write!(f, "UnitId({}..{})", &hex_str[..12], &hex_str[hex_str.len() - 4..])
        } else {
            write!(f, "UnitId({})", hex_str)
        }
    }
}

impl FromStr for UnitId {
    type Err = UnitIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// ID of the fungible unit carved off by a split.
///
/// Both the builder (to tell the caller where the value went) and the block
/// processor (to create the record) derive it from the original unit ID and
/// the hash of the split's signing bytes, so the two always agree.
pub fn split_unit_id(original: &TokenId, signing_bytes_hash: &[u8; 32]) -> TokenId {
    let body = domain_separated_hash(
        SPLIT_UNIT_ID_CONTEXT,
        &[original.as_bytes(), signing_bytes_hash],
    );
    UnitId::new(body, FUNGIBLE_TOKEN_TAG)
}

/// ID of the fee credit record owned by `public_key`.
pub fn fee_credit_record_id(public_key: &PublicKey) -> UnitId {
    UnitId::new(public_key.key_hash(), FEE_CREDIT_RECORD_TAG)
}
