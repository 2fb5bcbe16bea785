//! # Storage Module
//!
//! The wallet's local, replayed view of the tokens partition.
//!
//! ## Architecture
//!
//! ```text
//! block.rs      Block: a finalized round and its transaction records
//! db.rs         WalletDb: sled trees for units, indexes, proofs, metadata
//! processor.rs  BlockProcessor: replays blocks into WalletDb atomically
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! sync feed → Block → BlockProcessor → WalletDb ← TokensWallet / RPC reads
//! ```
//!
//! ## Design Decisions
//!
//! 1. **sled, one transaction per block.** All trees take part in every
//!    block's transaction, so a crash or a rejected record never leaves a
//!    half-applied round behind.
//!
//! 2. **Bincode on disk.** Units, types and proofs are stored in the same
//!    encoding the transaction layer hashes and signs with.

pub mod block;
pub mod db;
pub mod processor;

pub use block::Block;
pub use db::{DbError, WalletDb, WalletTx};
pub use processor::{BlockProcessor, ProcessError};
