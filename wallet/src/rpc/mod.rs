//! # Partition Capabilities
//!
//! The wallet never talks to the network directly. Everything it needs from
//! the tokens partition goes through [`RpcClient`], and everything it needs
//! from the fee credit protocol goes through [`FeeManager`]. Concrete
//! transports (HTTP, gRPC, an in-process test partition) are adapters that
//! implement these traits and are injected at construction time.
//!
//! ## Design Decisions
//!
//! - **Reads return typed units.** Adapters decode whatever the wire format
//!   is; the wallet only ever sees [`TokenUnit`], [`TokenTypeUnit`] and
//!   [`FeeCreditBill`].
//! - **Transport failures are opaque.** [`RpcError::Transport`] wraps an
//!   `anyhow::Error` so adapters can report anything without this crate
//!   knowing their error types. The wallet surfaces them to the caller as
//!   retryable and never retries on its own.

pub mod fees;

pub use fees::{FeeError, FeeManager, RecordFeeManager};

use async_trait::async_trait;
use thiserror::Error;

use crate::crypto::keys::{PubKeyHash, PublicKey};
use crate::transaction::{TransactionOrder, TxHash, TxProof};
use crate::unit::{FeeCreditBill, TokenId, TokenKind, TokenTypeUnit, TokenUnit, TypeId, UnitId};

/// Errors reported by an [`RpcClient`].
#[derive(Debug, Error)]
pub enum RpcError {
    /// The partition refused the transaction outright.
    #[error("transaction rejected by partition: {0}")]
    Rejected(String),

    #[error("rpc transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Client side of the tokens partition.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Submits an order. Returns its hash once the partition accepts it for
    /// execution (not once it is executed).
    async fn send_transaction(&self, tx: &TransactionOrder) -> Result<TxHash, RpcError>;

    /// Proof of an executed transaction, `None` while it is still pending.
    async fn get_transaction_proof(&self, tx_hash: &TxHash) -> Result<Option<TxProof>, RpcError>;

    /// Latest round the partition has produced.
    async fn get_round_number(&self) -> Result<u64, RpcError>;

    async fn get_token(&self, id: &TokenId) -> Result<Option<TokenUnit>, RpcError>;

    /// Tokens whose owner predicate is P2PKH over `owner`. `kind: None`
    /// returns both kinds.
    async fn get_tokens(
        &self,
        kind: Option<TokenKind>,
        owner: &PubKeyHash,
    ) -> Result<Vec<TokenUnit>, RpcError>;

    /// Token types, optionally filtered by kind and by the key that created
    /// them.
    async fn get_token_types(
        &self,
        kind: Option<TokenKind>,
        creator: Option<&PublicKey>,
    ) -> Result<Vec<TokenTypeUnit>, RpcError>;

    /// The type and its ancestors, leaf first. Empty when the type is
    /// unknown.
    async fn get_type_hierarchy(&self, id: &TypeId) -> Result<Vec<TokenTypeUnit>, RpcError>;

    async fn get_fee_credit_record(&self, id: &UnitId) -> Result<Option<FeeCreditBill>, RpcError>;
}
