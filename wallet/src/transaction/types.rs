//! Core type definitions for token partition transactions.
//!
//! A [`TransactionOrder`] is a [`Payload`] (what to do, to which unit, under
//! which fee terms) plus the proofs that authorize it. The payload alone is
//! what gets signed; proofs never cover themselves.
//!
//! Once the partition executes an order it comes back inside a
//! [`TransactionRecord`] carrying the fee actually charged and whether
//! execution succeeded, and a [`TxProof`] ties that record to a block round.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::crypto::hash::sha256;
use crate::unit::{Icon, TokenId, TypeId, UnitId};

/// SHA-256 of a transaction order.
pub type TxHash = [u8; 32];

/// Canonical encoding failed. With plain data structures this is not
/// expected to happen, but bincode's API is fallible and so is ours.
#[derive(Debug, Error)]
#[error("transaction encoding failed: {0}")]
pub struct EncodingError(#[from] bincode::Error);

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Defines a fungible token type. The payload's unit ID is the new type ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineFungibleTypeAttributes {
    pub symbol: String,
    pub name: String,
    pub icon: Icon,
    pub parent_type_id: Option<TypeId>,
    pub decimal_places: u32,
    pub sub_type_creation_predicate: Vec<u8>,
    pub token_minting_predicate: Vec<u8>,
    pub token_type_owner_predicate: Vec<u8>,
}

/// Defines an NFT type. The payload's unit ID is the new type ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineNftTypeAttributes {
    pub symbol: String,
    pub name: String,
    pub icon: Icon,
    pub parent_type_id: Option<TypeId>,
    pub sub_type_creation_predicate: Vec<u8>,
    pub token_minting_predicate: Vec<u8>,
    pub token_type_owner_predicate: Vec<u8>,
    pub data_update_predicate: Vec<u8>,
}

/// Mints a fungible token. The payload's unit ID is the new token ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintFungibleAttributes {
    pub type_id: TypeId,
    pub owner: Vec<u8>,
    pub value: u64,
}

/// Mints an NFT. The payload's unit ID is the new token ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintNftAttributes {
    pub type_id: TypeId,
    pub owner: Vec<u8>,
    pub name: String,
    pub uri: String,
    pub data: Vec<u8>,
    pub data_update_predicate: Vec<u8>,
}

/// Moves a whole fungible token to a new owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFungibleAttributes {
    pub type_id: TypeId,
    pub value: u64,
    pub new_owner: Vec<u8>,
    pub counter: u64,
}

/// Moves an NFT to a new owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferNftAttributes {
    pub type_id: TypeId,
    pub new_owner: Vec<u8>,
    pub counter: u64,
}

/// Carves `target_value` off a fungible token into a new unit owned by
/// `new_owner`; the original keeps `remaining_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAttributes {
    pub type_id: TypeId,
    pub target_value: u64,
    pub new_owner: Vec<u8>,
    pub remaining_value: u64,
    pub counter: u64,
}

/// Burns a fungible token so its value can be joined into the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnAttributes {
    pub type_id: TypeId,
    pub value: u64,
    pub target_token_id: TokenId,
    /// Counter the target token must still have when the join executes.
    pub target_token_counter: u64,
    pub counter: u64,
}

/// Folds confirmed burns into the payload's unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAttributes {
    pub burn_proofs: Vec<TxProof>,
    pub counter: u64,
}

/// Replaces an NFT's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNftAttributes {
    pub data: Vec<u8>,
    pub counter: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockAttributes {
    pub lock_status: u64,
    pub counter: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockAttributes {
    pub counter: u64,
}

/// Credits a fee credit record with value transferred from the money
/// partition. The payload's unit ID is the record ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFeeCreditAttributes {
    pub owner: Vec<u8>,
    pub transferred_amount: u64,
    pub transfer_fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseFeeCreditAttributes {
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFeeCreditAttributes {
    pub lock_status: u64,
}

/// Typed transaction attributes, one variant per transaction type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxAttributes {
    DefineFungibleType(DefineFungibleTypeAttributes),
    DefineNftType(DefineNftTypeAttributes),
    MintFungible(MintFungibleAttributes),
    MintNft(MintNftAttributes),
    TransferFungible(TransferFungibleAttributes),
    TransferNft(TransferNftAttributes),
    Split(SplitAttributes),
    Burn(BurnAttributes),
    Join(JoinAttributes),
    UpdateNft(UpdateNftAttributes),
    Lock(LockAttributes),
    Unlock(UnlockAttributes),
    AddFeeCredit(AddFeeCreditAttributes),
    CloseFeeCredit(CloseFeeCreditAttributes),
    LockFeeCredit(LockFeeCreditAttributes),
    UnlockFeeCredit,
}

impl TxAttributes {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DefineFungibleType(_) => "define-fungible-type",
            Self::DefineNftType(_) => "define-nft-type",
            Self::MintFungible(_) => "mint-fungible",
            Self::MintNft(_) => "mint-nft",
            Self::TransferFungible(_) => "transfer-fungible",
            Self::TransferNft(_) => "transfer-nft",
            Self::Split(_) => "split",
            Self::Burn(_) => "burn",
            Self::Join(_) => "join",
            Self::UpdateNft(_) => "update-nft",
            Self::Lock(_) => "lock",
            Self::Unlock(_) => "unlock",
            Self::AddFeeCredit(_) => "add-fee-credit",
            Self::CloseFeeCredit(_) => "close-fee-credit",
            Self::LockFeeCredit(_) => "lock-fee-credit",
            Self::UnlockFeeCredit => "unlock-fee-credit",
        }
    }

    /// Fee credit transactions pay for themselves out of the record they
    /// touch, not out of the client metadata's record.
    pub fn is_fee_credit(&self) -> bool {
        matches!(
            self,
            Self::AddFeeCredit(_)
                | Self::CloseFeeCredit(_)
                | Self::LockFeeCredit(_)
                | Self::UnlockFeeCredit
        )
    }
}

impl fmt::Display for TxAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Payload & TransactionOrder
// ---------------------------------------------------------------------------

/// Fee terms and validity window chosen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// First round in which the transaction is no longer valid.
    pub timeout_round: u64,
    pub max_fee: u64,
    /// Record the fee is charged to.
    pub fee_credit_record_id: Option<UnitId>,
}

/// The signed part of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub partition_id: u32,
    pub unit_id: UnitId,
    pub attributes: TxAttributes,
    pub client_metadata: ClientMetadata,
}

impl Payload {
    /// Canonical bytes every proof in the order signs.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        Ok(bincode::serialize(self)?)
    }
}

/// A transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOrder {
    pub payload: Payload,
    /// Satisfies the unit's own predicate (owner, or the type's minting
    /// predicate's companion signature for creations).
    pub owner_proof: Vec<u8>,
    /// One proof per inherited predicate level, root type first. For NFT
    /// data updates the token's own data update proof comes last.
    pub type_proofs: Vec<Vec<u8>>,
}

impl TransactionOrder {
    pub fn unit_id(&self) -> &UnitId {
        &self.payload.unit_id
    }

    pub fn attributes(&self) -> &TxAttributes {
        &self.payload.attributes
    }

    pub fn timeout_round(&self) -> u64 {
        self.payload.client_metadata.timeout_round
    }

    /// Bytes the proofs sign. Independent of the proofs themselves.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        self.payload.signing_bytes()
    }

    /// SHA-256 of the signing bytes. Seeds the ID of a split's new unit.
    pub fn signing_hash(&self) -> Result<[u8; 32], EncodingError> {
        Ok(sha256(&self.signing_bytes()?))
    }

    /// Hash of the whole order, proofs included. This is what the partition
    /// indexes proofs by.
    pub fn hash(&self) -> Result<TxHash, EncodingError> {
        Ok(sha256(&bincode::serialize(self)?))
    }
}

// ---------------------------------------------------------------------------
// Execution results
// ---------------------------------------------------------------------------

/// Outcome of executing an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Successful,
    /// Executed but rejected. The fee is still charged.
    Failed,
}

/// What the partition adds to an order on execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetadata {
    pub actual_fee: u64,
    pub status: TxStatus,
}

/// An executed order as it appears in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub order: TransactionOrder,
    pub server_metadata: ServerMetadata,
}

impl TransactionRecord {
    pub fn successful(order: TransactionOrder, actual_fee: u64) -> Self {
        Self {
            order,
            server_metadata: ServerMetadata {
                actual_fee,
                status: TxStatus::Successful,
            },
        }
    }

    pub fn is_successful(&self) -> bool {
        self.server_metadata.status == TxStatus::Successful
    }
}

/// Proof that a record was included in the block of `block_round`.
///
/// `proof` is the partition's inclusion proof, opaque to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxProof {
    pub record: TransactionRecord,
    pub block_round: u64,
    pub proof: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{FUNGIBLE_TOKEN_TAG, FUNGIBLE_TOKEN_TYPE_TAG};

    fn order(owner_proof: Vec<u8>) -> TransactionOrder {
        TransactionOrder {
            payload: Payload {
                partition_id: 2,
                unit_id: UnitId::new([1u8; 32], FUNGIBLE_TOKEN_TAG),
                attributes: TxAttributes::TransferFungible(TransferFungibleAttributes {
                    type_id: UnitId::new([2u8; 32], FUNGIBLE_TOKEN_TYPE_TAG),
                    value: 100,
                    new_owner: vec![0x83, 0x01],
                    counter: 4,
                }),
                client_metadata: ClientMetadata {
                    timeout_round: 20,
                    max_fee: 10,
                    fee_credit_record_id: None,
                },
            },
            owner_proof,
            type_proofs: vec![],
        }
    }

    #[test]
    fn signing_bytes_exclude_proofs() {
        let unsigned = order(vec![]);
        let signed = order(vec![7u8; 96]);
        assert_eq!(
            unsigned.signing_bytes().unwrap(),
            signed.signing_bytes().unwrap()
        );
        assert_ne!(unsigned.hash().unwrap(), signed.hash().unwrap());
    }

    #[test]
    fn signing_bytes_cover_payload() {
        let a = order(vec![]);
        let mut b = order(vec![]);
        b.payload.client_metadata.timeout_round += 1;
        assert_ne!(a.signing_bytes().unwrap(), b.signing_bytes().unwrap());
        assert_ne!(a.signing_hash().unwrap(), b.signing_hash().unwrap());
    }

    #[test]
    fn fee_credit_classification() {
        assert!(TxAttributes::UnlockFeeCredit.is_fee_credit());
        let close = TxAttributes::CloseFeeCredit(CloseFeeCreditAttributes { amount: 1 });
        assert!(close.is_fee_credit());
        assert!(!order(vec![]).attributes().is_fee_credit());
        assert_eq!(order(vec![]).attributes().name(), "transfer-fungible");
    }
}
