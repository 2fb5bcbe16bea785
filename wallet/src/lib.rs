// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Token Wallet, a Client-Side Ledger Engine
//!
//! The wallet side of a partitioned token ledger. It picks which units pay
//! for a transfer, builds and signs transactions for the whole token
//! lifecycle, submits them, and keeps a local view of ownership by replaying
//! finalized blocks.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - **crypto**: SHA-256/BLAKE3 hashing and Ed25519 account keys.
//! - **unit**: Tagged unit IDs and the unit records (types, tokens, fee credit).
//! - **predicate**: Predicate templates and the clause/argument grammar.
//! - **selector**: Which units pay for a transfer, which ones are dust.
//! - **transaction**: Attributes, orders, records, and the signing builder.
//! - **rpc**: Capabilities the wallet consumes: partition client, fee credit.
//! - **submit**: Send, then optionally wait for a proof.
//! - **tokens**: The lifecycle operations, tying all of the above together.
//! - **storage**: Blocks, the sled-backed local view, and the block processor.
//! - **config** / **logging**: Limits, defaults, and tracing bootstrap.
//!
//! ## Design Philosophy
//!
//! 1. The network is a capability. Nothing here opens a socket.
//! 2. Signing bytes never include proofs, so every proof signs the same bytes.
//! 3. A block lands completely or not at all.

pub mod config;
pub mod crypto;
pub mod logging;
pub mod predicate;
pub mod rpc;
pub mod selector;
pub mod storage;
pub mod submit;
pub mod tokens;
pub mod transaction;
pub mod unit;

pub use tokens::{TokensWallet, WalletError};
