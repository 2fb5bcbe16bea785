//! # Units
//!
//! The three kinds of state the wallet tracks on the tokens partition:
//!
//! - [`TokenTypeUnit`]: a fungible or non-fungible token *type*, with the
//!   predicates that gate sub-typing, minting, spending and NFT updates.
//! - [`TokenUnit`]: a token instance, fungible (carries an amount) or not
//!   (carries NFT name/URI/data).
//! - [`FeeCreditBill`]: an account's fee credit record, charged for every
//!   transaction the partition executes.
//!
//! All of them share the replay-protection pair `counter` + `tx_hash`: the
//! counter advances on every accepted mutation and `tx_hash` names the last
//! transaction that touched the unit.

pub mod id;

pub use id::{
    fee_credit_record_id, split_unit_id, TokenId, TypeId, UnitId, UnitIdError,
    FEE_CREDIT_RECORD_TAG, FUNGIBLE_TOKEN_TAG, FUNGIBLE_TOKEN_TYPE_TAG, NFT_TAG, NFT_TYPE_TAG,
    UNIT_ID_LENGTH,
};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transaction::TxHash;

// ---------------------------------------------------------------------------
// TokenKind & LockReason
// ---------------------------------------------------------------------------

/// Fungible or non-fungible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Fungible,
    NonFungible,
}

impl TokenKind {
    /// Tag carried by type IDs of this kind.
    pub fn type_tag(self) -> u8 {
        match self {
            TokenKind::Fungible => FUNGIBLE_TOKEN_TYPE_TAG,
            TokenKind::NonFungible => NFT_TYPE_TAG,
        }
    }

    /// Tag carried by token IDs of this kind.
    pub fn token_tag(self) -> u8 {
        match self {
            TokenKind::Fungible => FUNGIBLE_TOKEN_TAG,
            TokenKind::NonFungible => NFT_TAG,
        }
    }

    /// Kind of the token behind `id`, if its tag names one.
    pub fn from_token_id(id: &TokenId) -> Option<Self> {
        [TokenKind::Fungible, TokenKind::NonFungible]
            .into_iter()
            .find(|kind| id.has_tag(kind.token_tag()))
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Fungible => write!(f, "fungible"),
            TokenKind::NonFungible => write!(f, "non-fungible"),
        }
    }
}

/// Why a unit is locked. Stored on the unit as its `u64` code; zero means
/// unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u64)]
pub enum LockReason {
    Manual = 1,
    AddFees = 2,
    ReclaimFees = 3,
    CollectDust = 4,
}

impl LockReason {
    pub fn code(self) -> u64 {
        self as u64
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(LockReason::Manual),
            2 => Some(LockReason::AddFees),
            3 => Some(LockReason::ReclaimFees),
            4 => Some(LockReason::CollectDust),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TokenTypeUnit
// ---------------------------------------------------------------------------

/// Icon attached to a token type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    /// MIME type, e.g. `image/png`.
    pub icon_type: String,
    pub data: Vec<u8>,
}

/// A token type as recorded on the partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTypeUnit {
    pub id: TypeId,
    pub kind: TokenKind,
    /// `None` for a root type.
    pub parent_type_id: Option<TypeId>,
    pub symbol: String,
    pub name: String,
    pub icon: Icon,
    /// Must be satisfied to define a sub-type of this type.
    pub sub_type_creation_predicate: Vec<u8>,
    /// Must be satisfied to mint tokens of this type.
    pub token_minting_predicate: Vec<u8>,
    /// Must be satisfied (in addition to the token's own owner) to spend
    /// tokens of this type.
    pub token_type_owner_predicate: Vec<u8>,
    /// Fungible types only.
    pub decimal_places: u32,
    /// NFT types only: must be satisfied to update an instance's data.
    pub data_update_predicate: Vec<u8>,
    /// Public key that signed the defining transaction, when the owner proof
    /// was a P2PKH proof.
    pub creator: Option<crate::crypto::PublicKey>,
    pub tx_hash: TxHash,
}

// ---------------------------------------------------------------------------
// TokenUnit
// ---------------------------------------------------------------------------

/// NFT-specific fields of a [`TokenUnit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftData {
    pub name: String,
    pub uri: String,
    pub data: Vec<u8>,
    /// Instance-level predicate, satisfied last when updating `data`.
    pub data_update_predicate: Vec<u8>,
}

/// A token instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUnit {
    pub id: TokenId,
    pub type_id: TypeId,
    pub kind: TokenKind,
    /// Owner predicate bytes.
    pub owner: Vec<u8>,
    /// Symbol of the type, denormalized for listing.
    pub symbol: String,
    /// Fungible only.
    pub amount: u64,
    /// Fungible only.
    pub decimals: u32,
    /// Non-fungible only.
    pub nft: Option<NftData>,
    pub counter: u64,
    pub tx_hash: TxHash,
    /// Zero means unlocked; otherwise a [`LockReason`] code.
    pub lock_status: u64,
    pub burned: bool,
}

impl TokenUnit {
    pub fn is_locked(&self) -> bool {
        self.lock_status != 0
    }

    /// Neither locked nor burned.
    pub fn is_spendable(&self) -> bool {
        !self.is_locked() && !self.burned
    }

    pub fn is_fungible(&self) -> bool {
        self.kind == TokenKind::Fungible
    }
}

// ---------------------------------------------------------------------------
// FeeCreditBill
// ---------------------------------------------------------------------------

/// An account's fee credit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCreditBill {
    pub id: UnitId,
    pub balance: u64,
    pub lock_status: u64,
    pub counter: u64,
    pub tx_hash: TxHash,
}

impl FeeCreditBill {
    pub fn is_locked(&self) -> bool {
        self.lock_status != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_match_id_tags() {
        let type_id = UnitId::random(TokenKind::NonFungible.type_tag());
        assert_eq!(TokenKind::from_token_id(&type_id), None);

        let nft_id = UnitId::random(TokenKind::NonFungible.token_tag());
        assert_eq!(TokenKind::from_token_id(&nft_id), Some(TokenKind::NonFungible));

        let token_id = UnitId::random(TokenKind::Fungible.token_tag());
        assert_eq!(TokenKind::from_token_id(&token_id), Some(TokenKind::Fungible));
    }

    #[test]
    fn lock_reason_codes() {
        assert_eq!(LockReason::CollectDust.code(), 4);
        assert_eq!(LockReason::from_code(1), Some(LockReason::Manual));
        assert_eq!(LockReason::from_code(0), None);
        assert_eq!(LockReason::from_code(9), None);
    }

    #[test]
    fn spendable_requires_unlocked_and_unburned() {
        let mut token = TokenUnit {
            id: UnitId::random(FUNGIBLE_TOKEN_TAG),
            type_id: UnitId::random(FUNGIBLE_TOKEN_TYPE_TAG),
            kind: TokenKind::Fungible,
            owner: vec![],
            symbol: "AB".into(),
            amount: 5,
            decimals: 2,
            nft: None,
            counter: 0,
            tx_hash: [0u8; 32],
            lock_status: 0,
            burned: false,
        };
        assert!(token.is_spendable());
        token.lock_status = LockReason::Manual.code();
        assert!(!token.is_spendable());
        token.lock_status = 0;
        token.burned = true;
        assert!(!token.is_spendable());
    }
}
