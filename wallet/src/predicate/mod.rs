//! # Predicate Resolution
//!
//! Turns the user-facing predicate strings into bytes the partition
//! understands, in two directions:
//!
//! - A **clause** becomes predicate bytes: the lock put on a new unit or a
//!   new type (`"ptpkh:2"` becomes the P2PKH template for account 2's key).
//! - An **argument** becomes a [`PredicateInput`]: the thing that will
//!   *satisfy* some predicate once the transaction's signing bytes exist.
//!
//! ## Design Decisions
//!
//! - **Parse eagerly, sign lazily.** Both grammars are parsed up front (see
//!   [`parse`]), so a typo fails before fee credit is checked or a round is
//!   fetched. Signatures only exist once [`PredicateInput::proof`] is handed
//!   the final signing bytes.
//!
//! - **Type proof chains are explicit.** Inherited predicates are satisfied
//!   level by level, root first. [`compose_type_proofs`] expands whatever the
//!   caller supplied into exactly one input per level instead of recursing
//!   through the hierarchy.

pub mod parse;
pub mod templates;

pub use parse::{parse_argument, parse_clause, PredicateArgument, PredicateClause};

use std::sync::Arc;
use thiserror::Error;

use crate::crypto::keys::{AccountKey, AccountKeyProvider, KeyError};

/// Errors that can occur while parsing or resolving predicates.
#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("invalid predicate clause: {0:?}")]
    InvalidClause(String),

    #[error("invalid predicate argument: {0:?}")]
    InvalidArgument(String),

    #[error("invalid account number {0}: account numbers start at 1")]
    InvalidAccountNumber(i64),

    #[error("predicate input count {given} does not match {levels} type levels")]
    ProofCountMismatch { given: usize, levels: usize },

    #[error("account key unavailable: {0}")]
    Key(#[from] KeyError),

    #[error("failed to read predicate file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// PredicateInput
// ---------------------------------------------------------------------------

/// Something that can satisfy a predicate.
///
/// The variants differ only in how the proof is produced; callers treat
/// them uniformly through [`PredicateInput::proof`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateInput {
    /// Explicit argument bytes, used as the proof verbatim. Empty is the
    /// nil argument.
    Argument(Vec<u8>),
    /// Produce a P2PKH proof with this key.
    Key(AccountKey),
}

impl PredicateInput {
    /// The nil argument (satisfies always-true).
    pub fn nil() -> Self {
        PredicateInput::Argument(Vec::new())
    }

    /// The proof bytes for a transaction with the given signing bytes.
    pub fn proof(&self, signing_bytes: &[u8]) -> Vec<u8> {
        match self {
            PredicateInput::Argument(bytes) => bytes.clone(),
            PredicateInput::Key(key) => templates::p2pkh_proof(key, signing_bytes),
        }
    }
}

/// Expands caller-supplied inputs to exactly one per type level.
///
/// With `levels` levels and `k` inputs: `k == levels` uses them in order,
/// `k == 1` repeats the single input, `k == 0` uses the nil argument
/// everywhere. Anything else is an error.
pub fn compose_type_proofs(
    inputs: &[PredicateInput],
    levels: usize,
) -> Result<Vec<PredicateInput>, PredicateError> {
    match inputs.len() {
        k if k == levels => Ok(inputs.to_vec()),
        0 => Ok(vec![PredicateInput::nil(); levels]),
        1 => Ok(vec![inputs[0].clone(); levels]),
        given => Err(PredicateError::ProofCountMismatch { given, levels }),
    }
}

// ---------------------------------------------------------------------------
// PredicateResolver
// ---------------------------------------------------------------------------

/// Resolves clauses and arguments against the wallet's account keys.
///
/// `acting_account` is the one-based account number that a bare `"ptpkh"`
/// refers to.
#[derive(Clone)]
pub struct PredicateResolver {
    keys: Arc<dyn AccountKeyProvider>,
}

impl PredicateResolver {
    pub fn new(keys: Arc<dyn AccountKeyProvider>) -> Self {
        Self { keys }
    }

    /// Key of a one-based account number.
    pub fn account_key(&self, account_number: u64) -> Result<AccountKey, PredicateError> {
        if account_number < 1 {
            return Err(PredicateError::InvalidAccountNumber(account_number as i64));
        }
        Ok(self.keys.account_key(account_number - 1)?)
    }

    /// Number of accounts behind the resolver.
    pub fn account_count(&self) -> u64 {
        self.keys.account_count()
    }

    /// Parses and resolves a clause into predicate bytes.
    pub fn clause(&self, s: &str, acting_account: u64) -> Result<Vec<u8>, PredicateError> {
        let bytes = match parse_clause(s)? {
            PredicateClause::AlwaysTrue => templates::always_true(),
            PredicateClause::AlwaysFalse => templates::always_false(),
            PredicateClause::ActingAccount => {
                templates::p2pkh(&self.account_key(acting_account)?.pub_key_hash())
            }
            PredicateClause::Account(n) => templates::p2pkh(&self.account_key(n)?.pub_key_hash()),
            PredicateClause::PubKeyHash(hash) => templates::p2pkh(&hash),
            PredicateClause::Bytes(bytes) => bytes,
        };
        Ok(bytes)
    }

    /// Parses and resolves an argument into a [`PredicateInput`].
    pub fn argument(&self, s: &str, acting_account: u64) -> Result<PredicateInput, PredicateError> {
        let input = match parse_argument(s)? {
            PredicateArgument::Nil => PredicateInput::nil(),
            PredicateArgument::ActingAccount => {
                PredicateInput::Key(self.account_key(acting_account)?)
            }
            PredicateArgument::Account(n) => PredicateInput::Key(self.account_key(n)?),
            PredicateArgument::Bytes(bytes) => PredicateInput::Argument(bytes),
        };
        Ok(input)
    }

    /// Resolves a list of arguments, in order.
    pub fn arguments<S: AsRef<str>>(
        &self,
        args: &[S],
        acting_account: u64,
    ) -> Result<Vec<PredicateInput>, PredicateError> {
        args.iter()
            .map(|s| self.argument(s.as_ref(), acting_account))
            .collect()
    }
}

impl std::fmt::Debug for PredicateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateResolver")
            .field("accounts", &self.keys.account_count())
            .finish()
    }
}
