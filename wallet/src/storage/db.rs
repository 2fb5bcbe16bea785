//! # WalletDb, the Local Ledger View
//!
//! The wallet's replayed view of the tokens partition, built on sled's
//! embedded key-value store. The block processor is the only writer; every
//! other component reads.
//!
//! ## Tree Layout
//!
//! | Tree          | Key                              | Value                   |
//! |---------------|----------------------------------|-------------------------|
//! | `tokens`      | `unit_id` (33B)                  | `bincode(TokenUnit)`    |
//! | `owner_index` | `blake3(owner)` (32B) ++ unit_id | empty                   |
//! | `types`       | `type_id` (33B)                  | `bincode(TokenTypeUnit)`|
//! | `fee_credits` | `fcr_id` (33B)                   | `bincode(FeeCreditBill)`|
//! | `tx_proofs`   | `tx_hash` (32B)                  | `bincode(TxProof)`      |
//! | `metadata`    | key (UTF-8)                      | value (bytes)           |
//!
//! The owner index is keyed by the BLAKE3 hash of the owner predicate, so a
//! prefix scan finds every token locked by the same predicate, whatever its
//! shape. Looking up a key's tokens is a scan over `blake3(p2pkh(pkh))`.
//!
//! ## Atomicity
//!
//! All writes go through [`WalletDb::transaction`], a sled multi-tree
//! transaction over every tree above. A block either lands completely,
//! `last_block_number` included, or not at all.

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::Path;

use crate::crypto::hash::blake3_hash;
use crate::crypto::keys::{PubKeyHash, PublicKey};
use crate::predicate::templates;
use crate::transaction::{TxHash, TxProof};
use crate::unit::{FeeCreditBill, TokenKind, TokenTypeUnit, TokenUnit, TypeId, UnitId};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Result type of a step inside [`WalletDb::transaction`].
pub type TxResult<T, E> = Result<T, ConflictableTransactionError<E>>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `metadata` tree for the last processed round.
const META_LAST_BLOCK_NUMBER: &[u8] = b"last_block_number";

/// Guard against cyclic parent pointers in corrupted data.
const MAX_TYPE_DEPTH: usize = 1024;

fn encode<T: serde::Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode_round(bytes: &[u8]) -> DbResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization("invalid round bytes".to_string()))?;
    Ok(u64::from_be_bytes(raw))
}

/// Owner index key prefix of an owner predicate.
fn owner_prefix(owner: &[u8]) -> [u8; 32] {
    blake3_hash(owner)
}

fn owner_index_key(owner: &[u8], unit_id: &UnitId) -> Vec<u8> {
    let mut key = owner_prefix(owner).to_vec();
    key.extend_from_slice(unit_id.as_bytes());
    key
}

// ---------------------------------------------------------------------------
// WalletDb
// ---------------------------------------------------------------------------

/// Persistent local ledger view.
///
/// Cheap to clone; every clone shares the same sled handles. Concurrent
/// readers are fine, writes must be serialized by the caller (one block
/// processor per view).
#[derive(Debug, Clone)]
pub struct WalletDb {
    db: Db,
    tokens: Tree,
    owner_index: Tree,
    types: Tree,
    fee_credits: Tree,
    tx_proofs: Tree,
    metadata: Tree,
}

impl WalletDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database, removed when the last handle drops.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        Ok(Self {
            tokens: db.open_tree("tokens")?,
            owner_index: db.open_tree("owner_index")?,
            types: db.open_tree("types")?,
            fee_credits: db.open_tree("fee_credits")?,
            tx_proofs: db.open_tree("tx_proofs")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    /// Runs `f` as one atomic transaction over every tree.
    ///
    /// `f` may be re-run if sled detects a conflict, so it must not have
    /// side effects outside the [`WalletTx`] it is handed. Returning
    /// `Err(ConflictableTransactionError::Abort(e))` discards every write
    /// and surfaces `e`.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: Fn(&WalletTx<'_, E>) -> TxResult<T, E>,
        E: From<DbError>,
    {
        let result = (
            &self.tokens,
            &self.owner_index,
            &self.types,
            &self.fee_credits,
            &self.tx_proofs,
            &self.metadata,
        )
            .transaction(|(tokens, owner_index, types, fee_credits, tx_proofs, metadata)| {
                f(&WalletTx {
                    tokens,
                    owner_index,
                    types,
                    fee_credits,
                    tx_proofs,
                    metadata,
                    _abort: PhantomData,
                })
            });

        match result {
            Ok(value) => Ok(value),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(DbError::Sled(e).into()),
        }
    }

    // -- Token queries ------------------------------------------------------

    pub fn get_token(&self, id: &UnitId) -> DbResult<Option<TokenUnit>> {
        self.tokens
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Tokens locked by exactly this owner predicate.
    pub fn tokens_by_owner_predicate(
        &self,
        owner: &[u8],
        kind: Option<TokenKind>,
    ) -> DbResult<Vec<TokenUnit>> {
        let mut tokens = Vec::new();
        for entry in self.owner_index.scan_prefix(owner_prefix(owner)) {
            let (key, _) = entry?;
            let unit_id = UnitId::from_bytes(&key[32..])
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            if let Some(token) = self.get_token(&unit_id)? {
                if kind.map_or(true, |k| token.kind == k) {
                    tokens.push(token);
                }
            }
        }
        Ok(tokens)
    }

    /// Tokens owned by the P2PKH predicate of `owner`.
    pub fn tokens_by_owner(
        &self,
        owner: &PubKeyHash,
        kind: Option<TokenKind>,
    ) -> DbResult<Vec<TokenUnit>> {
        self.tokens_by_owner_predicate(&templates::p2pkh(owner), kind)
    }

    // -- Type queries -------------------------------------------------------

    pub fn get_token_type(&self, id: &TypeId) -> DbResult<Option<TokenTypeUnit>> {
        self.types
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Token types, filtered by kind and creator when given.
    pub fn token_types(
        &self,
        kind: Option<TokenKind>,
        creator: Option<&PublicKey>,
    ) -> DbResult<Vec<TokenTypeUnit>> {
        let mut types = Vec::new();
        for entry in self.types.iter() {
            let (_, bytes) = entry?;
            let unit: TokenTypeUnit = decode(&bytes)?;
            if kind.map_or(true, |k| unit.kind == k)
                && creator.map_or(true, |c| unit.creator.as_ref() == Some(c))
            {
                types.push(unit);
            }
        }
        Ok(types)
    }

    /// The type and its ancestors, leaf first. Empty for an unknown type.
    pub fn type_hierarchy(&self, id: &TypeId) -> DbResult<Vec<TokenTypeUnit>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id.clone());

        while let Some(type_id) = next {
            if !seen.insert(type_id.clone()) || chain.len() >= MAX_TYPE_DEPTH {
                return Err(DbError::Serialization(format!(
                    "type hierarchy of {} is cyclic or too deep",
                    id
                )));
            }
            let Some(unit) = self.get_token_type(&type_id)? else {
                break;
            };
            next = unit.parent_type_id.clone();
            chain.push(unit);
        }
        Ok(chain)
    }

    // -- Fee credit & proofs ------------------------------------------------

    pub fn get_fee_credit_bill(&self, id: &UnitId) -> DbResult<Option<FeeCreditBill>> {
        self.fee_credits
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Proof of a replayed transaction.
    pub fn get_tx_proof(&self, tx_hash: &TxHash) -> DbResult<Option<TxProof>> {
        self.tx_proofs
            .get(tx_hash)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    // -- Metadata -----------------------------------------------------------

    /// Round of the last processed block, 0 before the first one.
    pub fn last_block_number(&self) -> DbResult<u64> {
        match self.metadata.get(META_LAST_BLOCK_NUMBER)? {
            Some(bytes) => decode_round(&bytes),
            None => Ok(0),
        }
    }

    // -- Utility operations -------------------------------------------------

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WalletTx
// ---------------------------------------------------------------------------

/// Typed view of every tree inside one [`WalletDb::transaction`].
///
/// `E` is the error the surrounding transaction aborts with.
pub struct WalletTx<'a, E> {
    tokens: &'a TransactionalTree,
    owner_index: &'a TransactionalTree,
    types: &'a TransactionalTree,
    fee_credits: &'a TransactionalTree,
    tx_proofs: &'a TransactionalTree,
    metadata: &'a TransactionalTree,
    _abort: PhantomData<fn() -> E>,
}

fn abort<E: From<DbError>>(e: DbError) -> ConflictableTransactionError<E> {
    ConflictableTransactionError::Abort(e.into())
}

impl<E: From<DbError>> WalletTx<'_, E> {
    pub fn get_token(&self, id: &UnitId) -> TxResult<Option<TokenUnit>, E> {
        match self.tokens.get(id.as_bytes())? {
            Some(bytes) => decode(&bytes).map(Some).map_err(abort::<E>),
            None => Ok(None),
        }
    }

    /// Inserts or replaces a token, keeping the owner index in step.
    pub fn put_token(&self, token: &TokenUnit) -> TxResult<(), E> {
        let bytes = encode(token).map_err(abort::<E>)?;
        if let Some(old) = self.tokens.insert(token.id.as_bytes(), bytes)? {
            let old: TokenUnit = decode(&old).map_err(abort::<E>)?;
            if old.owner != token.owner {
                self.owner_index
                    .remove(owner_index_key(&old.owner, &old.id))?;
            }
        }
        self.owner_index
            .insert(owner_index_key(&token.owner, &token.id), &[] as &[u8])?;
        Ok(())
    }

    pub fn remove_token(&self, id: &UnitId) -> TxResult<Option<TokenUnit>, E> {
        let Some(bytes) = self.tokens.remove(id.as_bytes())? else {
            return Ok(None);
        };
        let token: TokenUnit = decode(&bytes).map_err(abort::<E>)?;
        self.owner_index
            .remove(owner_index_key(&token.owner, &token.id))?;
        Ok(Some(token))
    }

    pub fn get_token_type(&self, id: &TypeId) -> TxResult<Option<TokenTypeUnit>, E> {
        match self.types.get(id.as_bytes())? {
            Some(bytes) => decode(&bytes).map(Some).map_err(abort::<E>),
            None => Ok(None),
        }
    }

    pub fn put_token_type(&self, unit: &TokenTypeUnit) -> TxResult<(), E> {
        let bytes = encode(unit).map_err(abort::<E>)?;
        self.types.insert(unit.id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_fee_credit_bill(&self, id: &UnitId) -> TxResult<Option<FeeCreditBill>, E> {
        match self.fee_credits.get(id.as_bytes())? {
            Some(bytes) => decode(&bytes).map(Some).map_err(abort::<E>),
            None => Ok(None),
        }
    }

    pub fn put_fee_credit_bill(&self, bill: &FeeCreditBill) -> TxResult<(), E> {
        let bytes = encode(bill).map_err(abort::<E>)?;
        self.fee_credits.insert(bill.id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn put_tx_proof(&self, tx_hash: &TxHash, proof: &TxProof) -> TxResult<(), E> {
        let bytes = encode(proof).map_err(abort::<E>)?;
        self.tx_proofs.insert(&tx_hash[..], bytes)?;
        Ok(())
    }

    pub fn last_block_number(&self) -> TxResult<u64, E> {
        match self.metadata.get(META_LAST_BLOCK_NUMBER)? {
            Some(bytes) => decode_round(&bytes).map_err(abort::<E>),
            None => Ok(0),
        }
    }

    pub fn set_last_block_number(&self, round: u64) -> TxResult<(), E> {
        self.metadata
            .insert(META_LAST_BLOCK_NUMBER, &round.to_be_bytes()[..])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
