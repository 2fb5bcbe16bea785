//! # Transaction Module
//!
//! Typed transaction orders for the tokens partition and the builder that
//! signs them.
//!
//! ## Architecture
//!
//! ```text
//! types.rs   : Attributes, Payload, TransactionOrder, records and proofs
//! builder.rs : Fluent TxBuilder: payload assembly and proof attachment
//! ```
//!
//! ## Design Decisions
//!
//! - Signing bytes are `bincode(payload)`. Proofs live outside the payload,
//!   so an order can carry any number of them without changing what they
//!   sign.
//! - The transaction hash covers the whole order, proofs included, and is
//!   SHA-256 like every other hash the partition computes.
//! - All amounts are `u64` in the smallest denomination. Decimals are a
//!   display concern of the token type.

pub mod builder;
pub mod types;

pub use builder::TxBuilder;
pub use types::{
    AddFeeCreditAttributes, BurnAttributes, ClientMetadata, CloseFeeCreditAttributes,
    DefineFungibleTypeAttributes, DefineNftTypeAttributes, EncodingError, JoinAttributes,
    LockAttributes, LockFeeCreditAttributes, MintFungibleAttributes, MintNftAttributes, Payload,
    ServerMetadata, SplitAttributes, TransactionOrder, TransactionRecord,
    TransferFungibleAttributes, TransferNftAttributes, TxAttributes, TxHash, TxProof, TxStatus,
    UnlockAttributes, UpdateNftAttributes,
};
