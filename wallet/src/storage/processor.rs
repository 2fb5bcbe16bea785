//! # Block Processor
//!
//! Replays finalized partition blocks into the [`WalletDb`].
//!
//! ## Processing pipeline
//!
//! ```text
//! Block(round)
//!   │
//!   ├─ round > last_block_number?          else InvalidBlockOrder
//!   │
//!   ├─ for each TransactionRecord, in order:
//!   │    ├─ charge actual_fee to the client's fee credit record
//!   │    │    (fee credit transactions settle their own record instead)
//!   │    ├─ Failed status → fee only, no state change
//!   │    ├─ apply the state transition for the attribute type
//!   │    └─ store the record's proof under the transaction hash
//!   │
//!   └─ last_block_number := round
//! ```
//!
//! ## Design Decisions
//!
//! - **One sled transaction per block.** Every step above runs inside a
//!   single [`WalletDb::transaction`]. The first failing record aborts it,
//!   so neither unit state nor `last_block_number` moves and the caller can
//!   retry the same block unchanged.
//!
//! - **Replay, not validation.** Predicates and signatures were checked by
//!   the validators that finalized the block. The processor only checks the
//!   structural invariants the local view depends on (counters, lock state,
//!   value conservation, join consistency) so that a bad feed is detected
//!   instead of silently corrupting the view.

use std::collections::HashSet;
use std::fmt;

use sled::transaction::ConflictableTransactionError;
use tracing::{debug, info};

use super::block::Block;
use super::db::{DbError, TxResult, WalletDb, WalletTx};
use crate::predicate::templates;
use crate::transaction::{
    BurnAttributes, EncodingError, JoinAttributes, SplitAttributes, TransactionOrder,
    TransactionRecord, TxAttributes, TxHash, TxProof,
};
use crate::unit::{
    split_unit_id, FeeCreditBill, NftData, TokenKind, TokenTypeUnit, TokenUnit, TypeId, UnitId,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that abort a block's application.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("invalid block order: round {round} is not after last processed round {last}")]
    InvalidBlockOrder { round: u64, last: u64 },

    #[error("fee credit bill {0} not found")]
    FeeCreditBillNotFound(String),

    #[error("fee credit bill {id} balance {balance} cannot cover {charge}")]
    NegativeBalance {
        id: UnitId,
        balance: u64,
        charge: u64,
    },

    #[error("unit {0} not found")]
    UnitNotFound(UnitId),

    #[error("unit {0} already exists")]
    UnitExists(UnitId),

    #[error("unit {unit_id}: counter mismatch, expected {expected}, got {got}")]
    CounterMismatch {
        unit_id: UnitId,
        expected: u64,
        got: u64,
    },

    #[error("unit {0} is locked")]
    UnitLocked(UnitId),

    #[error("unit {0} is not locked")]
    UnitNotLocked(UnitId),

    #[error("unit {0} is burned")]
    UnitBurned(UnitId),

    #[error("unit {unit_id}: value mismatch, unit holds {expected}, transaction says {got}")]
    ValueMismatch {
        unit_id: UnitId,
        expected: u64,
        got: u64,
    },

    #[error("invalid split of {unit_id}: {remaining} + {target} != {amount}")]
    InvalidSplit {
        unit_id: UnitId,
        remaining: u64,
        target: u64,
        amount: u64,
    },

    #[error("invalid join into {unit_id}: {reason}")]
    InvalidJoin { unit_id: UnitId, reason: String },

    #[error("invalid unit {unit_id}: {reason}")]
    InvalidUnit { unit_id: UnitId, reason: String },

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("database error: {0}")]
    Db(#[from] DbError),
}

type Step<T> = TxResult<T, ProcessError>;
type Tx<'a> = WalletTx<'a, ProcessError>;

fn fail<T>(e: ProcessError) -> Step<T> {
    Err(ConflictableTransactionError::Abort(e))
}

fn invalid_unit(unit_id: &UnitId, reason: impl fmt::Display) -> ProcessError {
    ProcessError::InvalidUnit {
        unit_id: unit_id.clone(),
        reason: reason.to_string(),
    }
}

fn invalid_join(unit_id: &UnitId, reason: impl fmt::Display) -> ProcessError {
    ProcessError::InvalidJoin {
        unit_id: unit_id.clone(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// BlockProcessor
// ---------------------------------------------------------------------------

/// Applies blocks to a [`WalletDb`].
///
/// Calls must be serialized by the caller; the round check is the only
/// ordering guarantee the processor gives.
#[derive(Debug, Clone)]
pub struct BlockProcessor {
    db: WalletDb,
}

impl BlockProcessor {
    pub fn new(db: WalletDb) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &WalletDb {
        &self.db
    }

    /// Applies every record of `block`, or nothing.
    pub fn process_block(&self, block: &Block) -> Result<(), ProcessError> {
        // Hash outside the sled closure, which may run more than once.
        let hashes = block
            .transactions
            .iter()
            .map(|record| record.order.hash())
            .collect::<Result<Vec<_>, _>>()?;

        self.db.transaction::<_, ProcessError, _>(|tx| {
            let last = tx.last_block_number()?;
            if block.round <= last {
                return fail(ProcessError::InvalidBlockOrder {
                    round: block.round,
                    last,
                });
            }

            for (record, tx_hash) in block.transactions.iter().zip(&hashes) {
                apply_record(tx, record, tx_hash, block.round)?;
            }

            tx.set_last_block_number(block.round)
        })?;

        self.db.flush()?;
        info!(
            round = block.round,
            txs = block.transactions.len(),
            "block processed"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Record dispatch
// ---------------------------------------------------------------------------

fn apply_record(
    tx: &Tx<'_>,
    record: &TransactionRecord,
    tx_hash: &TxHash,
    round: u64,
) -> Step<()> {
    let order = &record.order;
    let attributes = order.attributes();
    let fee = record.server_metadata.actual_fee;

    debug!(
        unit_id = %order.unit_id(),
        tx_type = %attributes,
        fee,
        successful = record.is_successful(),
        "replaying transaction"
    );

    if !attributes.is_fee_credit() {
        charge_fee(tx, order, fee, tx_hash)?;
    }

    if record.is_successful() {
        let unit_id = order.unit_id();
        match attributes {
            TxAttributes::DefineFungibleType(a) => {
                let unit = TokenTypeUnit {
                    id: unit_id.clone(),
                    kind: TokenKind::Fungible,
                    parent_type_id: a.parent_type_id.clone(),
                    symbol: a.symbol.clone(),
                    name: a.name.clone(),
                    icon: a.icon.clone(),
                    sub_type_creation_predicate: a.sub_type_creation_predicate.clone(),
                    token_minting_predicate: a.token_minting_predicate.clone(),
                    token_type_owner_predicate: a.token_type_owner_predicate.clone(),
                    decimal_places: a.decimal_places,
                    data_update_predicate: Vec::new(),
                    creator: templates::proof_public_key(&order.owner_proof),
                    tx_hash: *tx_hash,
                };
                define_type(tx, unit)?;
            }
            TxAttributes::DefineNftType(a) => {
                let unit = TokenTypeUnit {
                    id: unit_id.clone(),
                    kind: TokenKind::NonFungible,
                    parent_type_id: a.parent_type_id.clone(),
                    symbol: a.symbol.clone(),
                    name: a.name.clone(),
                    icon: a.icon.clone(),
                    sub_type_creation_predicate: a.sub_type_creation_predicate.clone(),
                    token_minting_predicate: a.token_minting_predicate.clone(),
                    token_type_owner_predicate: a.token_type_owner_predicate.clone(),
                    decimal_places: 0,
                    data_update_predicate: a.data_update_predicate.clone(),
                    creator: templates::proof_public_key(&order.owner_proof),
                    tx_hash: *tx_hash,
                };
                define_type(tx, unit)?;
            }
            TxAttributes::MintFungible(a) => {
                let ty = mint_type(tx, unit_id, &a.type_id, TokenKind::Fungible)?;
                tx.put_token(&TokenUnit {
                    id: unit_id.clone(),
                    type_id: ty.id,
                    kind: TokenKind::Fungible,
                    owner: a.owner.clone(),
                    symbol: ty.symbol,
                    amount: a.value,
                    decimals: ty.decimal_places,
                    nft: None,
                    counter: 0,
                    tx_hash: *tx_hash,
                    lock_status: 0,
                    burned: false,
                })?;
            }
            TxAttributes::MintNft(a) => {
                let ty = mint_type(tx, unit_id, &a.type_id, TokenKind::NonFungible)?;
                tx.put_token(&TokenUnit {
                    id: unit_id.clone(),
                    type_id: ty.id,
                    kind: TokenKind::NonFungible,
                    owner: a.owner.clone(),
                    symbol: ty.symbol,
                    amount: 0,
                    decimals: 0,
                    nft: Some(NftData {
                        name: a.name.clone(),
                        uri: a.uri.clone(),
                        data: a.data.clone(),
                        data_update_predicate: a.data_update_predicate.clone(),
                    }),
                    counter: 0,
                    tx_hash: *tx_hash,
                    lock_status: 0,
                    burned: false,
                })?;
            }
            TxAttributes::TransferFungible(a) => {
                let mut token = spendable_token(tx, unit_id, TokenKind::Fungible, a.counter)?;
                if token.amount != a.value {
                    return fail(ProcessError::ValueMismatch {
                        unit_id: unit_id.clone(),
                        expected: token.amount,
                        got: a.value,
                    });
                }
                token.owner = a.new_owner.clone();
                advance(tx, &mut token, tx_hash)?;
            }
            TxAttributes::TransferNft(a) => {
                let mut token = spendable_token(tx, unit_id, TokenKind::NonFungible, a.counter)?;
                token.owner = a.new_owner.clone();
                advance(tx, &mut token, tx_hash)?;
            }
            TxAttributes::Split(a) => split(tx, order, a, tx_hash)?,
            TxAttributes::Burn(a) => burn(tx, unit_id, a, tx_hash)?,
            TxAttributes::Join(a) => join(tx, unit_id, a, tx_hash)?,
            TxAttributes::UpdateNft(a) => {
                let mut token = spendable_token(tx, unit_id, TokenKind::NonFungible, a.counter)?;
                let Some(nft) = token.nft.as_mut() else {
                    return fail(invalid_unit(unit_id, "NFT has no data record"));
                };
                nft.data = a.data.clone();
                advance(tx, &mut token, tx_hash)?;
            }
            TxAttributes::Lock(a) => {
                let mut token = unburned_token(tx, unit_id, a.counter)?;
                if token.is_locked() {
                    return fail(ProcessError::UnitLocked(unit_id.clone()));
                }
                if a.lock_status == 0 {
                    return fail(invalid_unit(unit_id, "lock status must be non-zero"));
                }
                token.lock_status = a.lock_status;
                advance(tx, &mut token, tx_hash)?;
            }
            TxAttributes::Unlock(a) => {
                let mut token = unburned_token(tx, unit_id, a.counter)?;
                if !token.is_locked() {
                    return fail(ProcessError::UnitNotLocked(unit_id.clone()));
                }
                token.lock_status = 0;
                advance(tx, &mut token, tx_hash)?;
            }
            TxAttributes::AddFeeCredit(a) => {
                let mut bill = tx.get_fee_credit_bill(unit_id)?.unwrap_or(FeeCreditBill {
                    id: unit_id.clone(),
                    balance: 0,
                    lock_status: 0,
                    counter: 0,
                    tx_hash: [0u8; 32],
                });
                let credit = a
                    .transferred_amount
                    .checked_sub(a.transfer_fee)
                    .and_then(|v| v.checked_sub(fee));
                let Some(credit) = credit else {
                    return fail(ProcessError::NegativeBalance {
                        id: unit_id.clone(),
                        balance: a.transferred_amount,
                        charge: a.transfer_fee.saturating_add(fee),
                    });
                };
                bill.balance = bill.balance.saturating_add(credit);
                settle_bill(tx, bill, tx_hash)?;
            }
            TxAttributes::CloseFeeCredit(a) => {
                let mut bill = existing_bill(tx, unit_id)?;
                bill.balance = debit(&bill, a.amount)?;
                settle_bill(tx, bill, tx_hash)?;
            }
            TxAttributes::LockFeeCredit(a) => {
                let mut bill = existing_bill(tx, unit_id)?;
                bill.balance = debit(&bill, fee)?;
                bill.lock_status = a.lock_status;
                settle_bill(tx, bill, tx_hash)?;
            }
            TxAttributes::UnlockFeeCredit => {
                let mut bill = existing_bill(tx, unit_id)?;
                bill.balance = debit(&bill, fee)?;
                bill.lock_status = 0;
                settle_bill(tx, bill, tx_hash)?;
            }
        }
    }

    tx.put_tx_proof(
        tx_hash,
        &TxProof {
            record: record.clone(),
            block_round: round,
            proof: Vec::new(),
        },
    )
}

// ---------------------------------------------------------------------------
// Fee credit
// ---------------------------------------------------------------------------

fn charge_fee(tx: &Tx<'_>, order: &TransactionOrder, fee: u64, tx_hash: &TxHash) -> Step<()> {
    let Some(fcr_id) = order.payload.client_metadata.fee_credit_record_id.as_ref() else {
        if fee == 0 {
            return Ok(());
        }
        return fail(ProcessError::FeeCreditBillNotFound("<none>".into()));
    };
    let mut bill = existing_bill(tx, fcr_id)?;
    bill.balance = debit(&bill, fee)?;
    bill.tx_hash = *tx_hash;
    tx.put_fee_credit_bill(&bill)
}

fn existing_bill(tx: &Tx<'_>, id: &UnitId) -> Step<FeeCreditBill> {
    match tx.get_fee_credit_bill(id)? {
        Some(bill) => Ok(bill),
        None => fail(ProcessError::FeeCreditBillNotFound(id.to_string())),
    }
}

fn debit(bill: &FeeCreditBill, charge: u64) -> Step<u64> {
    match bill.balance.checked_sub(charge) {
        Some(balance) => Ok(balance),
        None => fail(ProcessError::NegativeBalance {
            id: bill.id.clone(),
            balance: bill.balance,
            charge,
        }),
    }
}

fn settle_bill(tx: &Tx<'_>, mut bill: FeeCreditBill, tx_hash: &TxHash) -> Step<()> {
    bill.counter += 1;
    bill.tx_hash = *tx_hash;
    tx.put_fee_credit_bill(&bill)
}

// ---------------------------------------------------------------------------
// Types & mints
// ---------------------------------------------------------------------------

fn define_type(tx: &Tx<'_>, unit: TokenTypeUnit) -> Step<()> {
    if !unit.id.has_tag(unit.kind.type_tag()) {
        return fail(invalid_unit(&unit.id, format!("not a {} type id", unit.kind)));
    }
    if tx.get_token_type(&unit.id)?.is_some() {
        return fail(ProcessError::UnitExists(unit.id.clone()));
    }
    if let Some(parent_id) = &unit.parent_type_id {
        let Some(parent) = tx.get_token_type(parent_id)? else {
            return fail(ProcessError::UnitNotFound(parent_id.clone()));
        };
        if parent.kind != unit.kind {
            return fail(invalid_unit(&unit.id, "parent type is of a different kind"));
        }
        if parent.decimal_places != unit.decimal_places {
            return fail(invalid_unit(
                &unit.id,
                format!(
                    "decimal places {} differ from parent's {}",
                    unit.decimal_places, parent.decimal_places
                ),
            ));
        }
    }
    tx.put_token_type(&unit)
}

fn mint_type(
    tx: &Tx<'_>,
    token_id: &UnitId,
    type_id: &TypeId,
    kind: TokenKind,
) -> Step<TokenTypeUnit> {
    if !token_id.has_tag(kind.token_tag()) {
        return fail(invalid_unit(token_id, format!("not a {} token id", kind)));
    }
    if tx.get_token(token_id)?.is_some() {
        return fail(ProcessError::UnitExists(token_id.clone()));
    }
    match tx.get_token_type(type_id)? {
        Some(ty) if ty.kind == kind => Ok(ty),
        Some(_) => fail(invalid_unit(token_id, format!("type {} is not {}", type_id, kind))),
        None => fail(ProcessError::UnitNotFound(type_id.clone())),
    }
}

// ---------------------------------------------------------------------------
// Token transitions
// ---------------------------------------------------------------------------

/// Token exists and `counter` matches.
fn existing_token(tx: &Tx<'_>, id: &UnitId, counter: u64) -> Step<TokenUnit> {
    let Some(token) = tx.get_token(id)? else {
        return fail(ProcessError::UnitNotFound(id.clone()));
    };
    if token.counter != counter {
        return fail(ProcessError::CounterMismatch {
            unit_id: id.clone(),
            expected: token.counter,
            got: counter,
        });
    }
    Ok(token)
}

/// Token exists, `counter` matches, and it is not burned.
fn unburned_token(tx: &Tx<'_>, id: &UnitId, counter: u64) -> Step<TokenUnit> {
    let token = existing_token(tx, id, counter)?;
    if token.burned {
        return fail(ProcessError::UnitBurned(id.clone()));
    }
    Ok(token)
}

/// Token exists, is of `kind`, `counter` matches, and it is neither locked
/// nor burned.
fn spendable_token(
    tx: &Tx<'_>,
    id: &UnitId,
    kind: TokenKind,
    counter: u64,
) -> Step<TokenUnit> {
    let token = existing_token(tx, id, counter)?;
    if token.kind != kind {
        return fail(invalid_unit(id, format!("not a {} token", kind)));
    }
    if token.is_locked() {
        return fail(ProcessError::UnitLocked(id.clone()));
    }
    if token.burned {
        return fail(ProcessError::UnitBurned(id.clone()));
    }
    Ok(token)
}

fn advance(tx: &Tx<'_>, token: &mut TokenUnit, tx_hash: &TxHash) -> Step<()> {
    token.counter += 1;
    token.tx_hash = *tx_hash;
    tx.put_token(token)
}

fn split(
    tx: &Tx<'_>,
    order: &TransactionOrder,
    attrs: &SplitAttributes,
    tx_hash: &TxHash,
) -> Step<()> {
    let unit_id = order.unit_id();
    let mut token = spendable_token(tx, unit_id, TokenKind::Fungible, attrs.counter)?;
    if attrs.target_value == 0
        || attrs.remaining_value.checked_add(attrs.target_value) != Some(token.amount)
    {
        return fail(ProcessError::InvalidSplit {
            unit_id: unit_id.clone(),
            remaining: attrs.remaining_value,
            target: attrs.target_value,
            amount: token.amount,
        });
    }

    let signing_hash = order
        .signing_hash()
        .map_err(|e| ConflictableTransactionError::Abort(ProcessError::from(e)))?;
    let new_id = split_unit_id(unit_id, &signing_hash);
    if tx.get_token(&new_id)?.is_some() {
        return fail(ProcessError::UnitExists(new_id));
    }

    tx.put_token(&TokenUnit {
        id: new_id,
        type_id: token.type_id.clone(),
        kind: TokenKind::Fungible,
        owner: attrs.new_owner.clone(),
        symbol: token.symbol.clone(),
        amount: attrs.target_value,
        decimals: token.decimals,
        nft: None,
        counter: 0,
        tx_hash: *tx_hash,
        lock_status: 0,
        burned: false,
    })?;

    token.amount = attrs.remaining_value;
    advance(tx, &mut token, tx_hash)
}

fn burn(tx: &Tx<'_>, unit_id: &UnitId, attrs: &BurnAttributes, tx_hash: &TxHash) -> Step<()> {
    let mut token = spendable_token(tx, unit_id, TokenKind::Fungible, attrs.counter)?;
    if token.amount != attrs.value {
        return fail(ProcessError::ValueMismatch {
            unit_id: unit_id.clone(),
            expected: token.amount,
            got: attrs.value,
        });
    }
    if token.type_id != attrs.type_id {
        return fail(invalid_unit(unit_id, "burn names a different type"));
    }
    token.burned = true;
    advance(tx, &mut token, tx_hash)
}

fn join(tx: &Tx<'_>, unit_id: &UnitId, attrs: &JoinAttributes, tx_hash: &TxHash) -> Step<()> {
    // The join target may be locked (dust collection locks it first); the
    // join itself releases the lock.
    let mut target = existing_token(tx, unit_id, attrs.counter)?;
    if target.kind != TokenKind::Fungible {
        return fail(invalid_join(unit_id, "target is not fungible"));
    }
    if target.burned {
        return fail(ProcessError::UnitBurned(unit_id.clone()));
    }
    if attrs.burn_proofs.is_empty() {
        return fail(invalid_join(unit_id, "no burn proofs"));
    }

    let mut seen = HashSet::new();
    let mut total = target.amount;
    for proof in &attrs.burn_proofs {
        let burn_order = &proof.record.order;
        let burned_id = burn_order.unit_id();
        let TxAttributes::Burn(burn) = burn_order.attributes() else {
            return fail(invalid_join(unit_id, format!("{} is not a burn", burned_id)));
        };
        if !proof.record.is_successful() {
            return fail(invalid_join(unit_id, format!("burn of {} failed", burned_id)));
        }
        if !seen.insert(burned_id.clone()) {
            return fail(invalid_join(unit_id, format!("{} burned twice", burned_id)));
        }
        if &burn.target_token_id != unit_id || burn.target_token_counter != target.counter {
            return fail(invalid_join(
                unit_id,
                format!("burn of {} targets another unit or counter", burned_id),
            ));
        }

        let Some(burned) = tx.get_token(burned_id)? else {
            return fail(ProcessError::UnitNotFound(burned_id.clone()));
        };
        if !burned.burned {
            return fail(invalid_join(unit_id, format!("{} is not burned", burned_id)));
        }
        if burned.owner != target.owner {
            return fail(invalid_join(unit_id, format!("{} has another owner", burned_id)));
        }
        if burned.type_id != target.type_id {
            return fail(invalid_join(unit_id, format!("{} has another type", burned_id)));
        }

        let Some(sum) = total.checked_add(burned.amount) else {
            return fail(invalid_join(unit_id, "joined amount overflows"));
        };
        total = sum;
        tx.remove_token(burned_id)?;
    }

    target.amount = total;
    target.lock_status = 0;
    advance(tx, &mut target, tx_hash)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::AccountKey;
    use crate::predicate::PredicateInput;
    use crate::transaction::{
        AddFeeCreditAttributes, CloseFeeCreditAttributes, DefineFungibleTypeAttributes,
        LockAttributes, LockFeeCreditAttributes, MintFungibleAttributes, ServerMetadata,
        TransferFungibleAttributes, TxBuilder, TxStatus, UnlockAttributes,
    };
    use crate::unit::{
        fee_credit_record_id, Icon, LockReason, TokenId, FUNGIBLE_TOKEN_TAG,
        FUNGIBLE_TOKEN_TYPE_TAG,
    };

    // -- Fixture ------------------------------------------------------------

    /// One account with 998 units of fee credit, feeding blocks in
    /// consecutive rounds.
    struct Fixture {
        processor: BlockProcessor,
        key: AccountKey,
        fcr: UnitId,
        round: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let key = AccountKey::generate();
            let fcr = fee_credit_record_id(&key.public_key());
            let mut f = Self {
                processor: BlockProcessor::new(WalletDb::open_temporary().unwrap()),
                key,
                fcr,
                round: 0,
            };
            let add = f.order(
                f.fcr.clone(),
                TxAttributes::AddFeeCredit(AddFeeCreditAttributes {
                    owner: f.owner(),
                    transferred_amount: 1_000,
                    transfer_fee: 1,
                }),
            );
            f.apply(vec![TransactionRecord::successful(add, 1)]).unwrap();
            f
        }

        fn owner(&self) -> Vec<u8> {
            templates::p2pkh(&self.key.pub_key_hash())
        }

        fn order(&self, unit_id: UnitId, attributes: TxAttributes) -> TransactionOrder {
            TxBuilder::new(2, unit_id, attributes)
                .timeout_round(100)
                .max_fee(10)
                .fee_credit_record_id(self.fcr.clone())
                .sign(&PredicateInput::Key(self.key.clone()), &[])
                .unwrap()
        }

        fn apply(&mut self, records: Vec<TransactionRecord>) -> Result<(), ProcessError> {
            self.round += 1;
            self.processor.process_block(&Block::new(self.round, records))
        }

        fn apply_ok(&mut self, orders: Vec<TransactionOrder>) {
            let records = orders
                .into_iter()
                .map(|o| TransactionRecord::successful(o, 1))
                .collect();
            self.apply(records).unwrap();
        }

        fn define_type(
            &mut self,
            parent: Option<TypeId>,
            decimal_places: u32,
        ) -> Result<TypeId, ProcessError> {
            let id = UnitId::random(FUNGIBLE_TOKEN_TYPE_TAG);
            let order = self.order(
                id.clone(),
                TxAttributes::DefineFungibleType(DefineFungibleTypeAttributes {
                    symbol: "TT".into(),
                    name: "Test Token".into(),
                    icon: Icon::default(),
                    parent_type_id: parent,
                    decimal_places,
                    sub_type_creation_predicate: templates::always_true(),
                    token_minting_predicate: templates::always_true(),
                    token_type_owner_predicate: templates::always_true(),
                }),
            );
            self.apply(vec![TransactionRecord::successful(order, 1)])?;
            Ok(id)
        }

        fn mint(&mut self, type_id: &TypeId, value: u64) -> TokenId {
            let id = UnitId::random(FUNGIBLE_TOKEN_TAG);
            let order = self.order(
                id.clone(),
                TxAttributes::MintFungible(MintFungibleAttributes {
                    type_id: type_id.clone(),
                    owner: self.owner(),
                    value,
                }),
            );
            self.apply_ok(vec![order]);
            id
        }

        fn burn(&self, id: &TokenId, target: &TokenUnit) -> TransactionOrder {
            let token = self.token(id);
            self.order(
                id.clone(),
                TxAttributes::Burn(BurnAttributes {
                    type_id: token.type_id,
                    value: token.amount,
                    target_token_id: target.id.clone(),
                    target_token_counter: target.counter,
                    counter: token.counter,
                }),
            )
        }

        fn token(&self, id: &TokenId) -> TokenUnit {
            self.processor.db().get_token(id).unwrap().unwrap()
        }

        fn bill(&self) -> FeeCreditBill {
            self.processor
                .db()
                .get_fee_credit_bill(&self.fcr)
                .unwrap()
                .unwrap()
        }
    }

    // -- Ordering & fees ----------------------------------------------------

    #[test]
    fn rejects_blocks_at_or_below_last_round() {
        let f = Fixture::new();
        let db = f.processor.db();
        assert_eq!(db.last_block_number().unwrap(), 1);

        f.processor.process_block(&Block::new(5, vec![])).unwrap();
        for round in [0, 4, 5] {
            let err = f
                .processor
                .process_block(&Block::new(round, vec![]))
                .unwrap_err();
            assert!(matches!(
                err,
                ProcessError::InvalidBlockOrder { last: 5, .. }
            ));
        }
        assert_eq!(db.last_block_number().unwrap(), 5);
    }

    #[test]
    fn add_fee_credit_nets_out_fees() {
        let f = Fixture::new();
        let bill = f.bill();
        assert_eq!(bill.balance, 998);
        assert_eq!(bill.counter, 1);
        assert!(!bill.is_locked());
    }

    #[test]
    fn actual_fee_is_charged_to_client_record() {
        let mut f = Fixture::new();
        f.define_type(None, 2).unwrap();
        let ty = f.define_type(None, 0).unwrap();
        f.mint(&ty, 10);
        assert_eq!(f.bill().balance, 995);
    }

    #[test]
    fn missing_or_exhausted_fee_credit_aborts() {
        let mut f = Fixture::new();
        let ty = f.define_type(None, 0).unwrap();

        let mint = TxBuilder::new(
            2,
            UnitId::random(FUNGIBLE_TOKEN_TAG),
            TxAttributes::MintFungible(MintFungibleAttributes {
                type_id: ty.clone(),
                owner: f.owner(),
                value: 1,
            }),
        )
        .fee_credit_record_id(UnitId::random(crate::unit::FEE_CREDIT_RECORD_TAG))
        .sign(&PredicateInput::nil(), &[])
        .unwrap();
        let err = f
            .apply(vec![TransactionRecord::successful(mint, 1)])
            .unwrap_err();
        assert!(matches!(err, ProcessError::FeeCreditBillNotFound(_)));

        let mint = f.order(
            UnitId::random(FUNGIBLE_TOKEN_TAG),
            TxAttributes::MintFungible(MintFungibleAttributes {
                type_id: ty,
                owner: f.owner(),
                value: 1,
            }),
        );
        let err = f
            .apply(vec![TransactionRecord::successful(mint, 5_000)])
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessError::NegativeBalance {
                balance: 997,
                charge: 5_000,
                ..
            }
        ));
        assert_eq!(f.bill().balance, 997);
    }

    #[test]
    fn failed_transactions_only_pay_fees() {
        let mut f = Fixture::new();
        let ty = f.define_type(None, 0).unwrap();
        let id = f.mint(&ty, 10);

        let transfer = f.order(
            id.clone(),
            TxAttributes::TransferFungible(TransferFungibleAttributes {
                type_id: ty,
                value: 10,
                new_owner: templates::always_true(),
                counter: 0,
            }),
        );
        let hash = transfer.hash().unwrap();
        f.apply(vec![TransactionRecord {
            order: transfer,
            server_metadata: ServerMetadata {
                actual_fee: 3,
                status: TxStatus::Failed,
            },
        }])
        .unwrap();

        let token = f.token(&id);
        assert_eq!(token.owner, f.owner());
        assert_eq!(token.counter, 0);
        assert_eq!(f.bill().balance, 998 - 1 - 1 - 3);
        assert!(f.processor.db().get_tx_proof(&hash).unwrap().is_some());
    }

    #[test]
    fn fee_credit_lock_unlock_and_close() {
        let mut f = Fixture::new();
        let lock = f.order(
            f.fcr.clone(),
            TxAttributes::LockFeeCredit(LockFeeCreditAttributes { lock_status: 1 }),
        );
        f.apply_ok(vec![lock]);
        assert!(f.bill().is_locked());
        assert_eq!(f.bill().balance, 997);

        let unlock = f.order(f.fcr.clone(), TxAttributes::UnlockFeeCredit);
        f.apply_ok(vec![unlock]);
        assert!(!f.bill().is_locked());

        let close = f.order(
            f.fcr.clone(),
            TxAttributes::CloseFeeCredit(CloseFeeCreditAttributes { amount: 996 }),
        );
        f.apply_ok(vec![close]);
        assert_eq!(f.bill().balance, 0);
        assert_eq!(f.bill().counter, 4);
    }

    // -- Types --------------------------------------------------------------

    #[test]
    fn type_records_creator_and_checks_parent_decimals() {
        let mut f = Fixture::new();
        let root = f.define_type(None, 2).unwrap();
        let stored = f.processor.db().get_token_type(&root).unwrap().unwrap();
        assert_eq!(stored.creator, Some(f.key.public_key()));
        assert_eq!(stored.decimal_places, 2);

        f.define_type(Some(root.clone()), 2).unwrap();
        let err = f.define_type(Some(root), 3).unwrap_err();
        assert!(matches!(err, ProcessError::InvalidUnit { .. }));

        let err = f
            .define_type(Some(UnitId::random(FUNGIBLE_TOKEN_TYPE_TAG)), 2)
            .unwrap_err();
        assert!(matches!(err, ProcessError::UnitNotFound(_)));
        assert_eq!(f.processor.db().type_count(), 2);
    }

    // -- Token transitions --------------------------------------------------

    #[test]
    fn split_creates_unit_with_derived_id() {
        let mut f = Fixture::new();
        let ty = f.define_type(None, 2).unwrap();
        let id = f.mint(&ty, 500);
        let bob = AccountKey::generate();

        let split = f.order(
            id.clone(),
            TxAttributes::Split(SplitAttributes {
                type_id: ty.clone(),
                target_value: 200,
                new_owner: templates::p2pkh(&bob.pub_key_hash()),
                remaining_value: 300,
                counter: 0,
            }),
        );
        let new_id = split_unit_id(&id, &split.signing_hash().unwrap());
        let hash = split.hash().unwrap();
        f.apply_ok(vec![split]);

        let original = f.token(&id);
        assert_eq!(original.amount, 300);
        assert_eq!(original.counter, 1);
        assert_eq!(original.tx_hash, hash);

        let created = f.token(&new_id);
        assert_eq!(created.amount, 200);
        assert_eq!(created.decimals, 2);
        assert_eq!(created.counter, 0);
        assert_eq!(created.type_id, ty);
        assert_eq!(
            f.processor
                .db()
                .tokens_by_owner(&bob.pub_key_hash(), None)
                .unwrap(),
            vec![created]
        );
    }

    #[test]
    fn split_must_conserve_value() {
        let mut f = Fixture::new();
        let ty = f.define_type(None, 0).unwrap();
        let id = f.mint(&ty, 500);
        let last = f.processor.db().last_block_number().unwrap();

        let split = f.order(
            id.clone(),
            TxAttributes::Split(SplitAttributes {
                type_id: ty,
                target_value: 200,
                new_owner: templates::always_true(),
                remaining_value: 250,
                counter: 0,
            }),
        );
        let err = f
            .apply(vec![TransactionRecord::successful(split, 1)])
            .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidSplit { amount: 500, .. }));
        assert_eq!(f.token(&id).amount, 500);
        assert_eq!(f.processor.db().last_block_number().unwrap(), last);
    }

    #[test]
    fn counter_mismatch_aborts_whole_block() {
        let mut f = Fixture::new();
        let ty = f.define_type(None, 0).unwrap();
        let id = f.mint(&ty, 10);
        let fresh = UnitId::random(FUNGIBLE_TOKEN_TAG);

        let mint = f.order(
            fresh.clone(),
            TxAttributes::MintFungible(MintFungibleAttributes {
                type_id: ty.clone(),
                owner: f.owner(),
                value: 1,
            }),
        );
        let stale = f.order(
            id,
            TxAttributes::TransferFungible(TransferFungibleAttributes {
                type_id: ty,
                value: 10,
                new_owner: templates::always_true(),
                counter: 5,
            }),
        );
        let err = f
            .apply(vec![
                TransactionRecord::successful(mint, 1),
                TransactionRecord::successful(stale, 1),
            ])
            .unwrap_err();

        assert!(matches!(
            err,
            ProcessError::CounterMismatch {
                expected: 0,
                got: 5,
                ..
            }
        ));
        assert!(f.processor.db().get_token(&fresh).unwrap().is_none());
    }

    #[test]
    fn locked_units_refuse_transfers_until_unlocked() {
        let mut f = Fixture::new();
        let ty = f.define_type(None, 0).unwrap();
        let id = f.mint(&ty, 10);
        let transfer = |counter| {
            f.order(
                id.clone(),
                TxAttributes::TransferFungible(TransferFungibleAttributes {
                    type_id: ty.clone(),
                    value: 10,
                    new_owner: templates::always_true(),
                    counter,
                }),
            )
        };
        let blocked = transfer(1);
        let allowed = transfer(2);

        let lock = f.order(
            id.clone(),
            TxAttributes::Lock(LockAttributes {
                lock_status: LockReason::Manual.code(),
                counter: 0,
            }),
        );
        f.apply_ok(vec![lock]);
        assert!(f.token(&id).is_locked());

        let err = f
            .apply(vec![TransactionRecord::successful(blocked, 1)])
            .unwrap_err();
        assert!(matches!(err, ProcessError::UnitLocked(_)));

        let unlock = f.order(
            id.clone(),
            TxAttributes::Unlock(UnlockAttributes { counter: 1 }),
        );
        f.apply_ok(vec![unlock]);
        f.apply_ok(vec![allowed]);

        let token = f.token(&id);
        assert!(!token.is_locked());
        assert_eq!(token.owner, templates::always_true());
        assert_eq!(token.counter, 3);
    }

    #[test]
    fn join_folds_burned_units_into_target() {
        let mut f = Fixture::new();
        let ty = f.define_type(None, 0).unwrap();
        let target_id = f.mint(&ty, 10);
        let a = f.mint(&ty, 15);
        let b = f.mint(&ty, 8);

        let target = f.token(&target_id);
        let burns = vec![f.burn(&a, &target), f.burn(&b, &target)];
        let hashes: Vec<_> = burns.iter().map(|o| o.hash().unwrap()).collect();
        f.apply_ok(burns);
        assert!(f.token(&a).burned);

        let burn_proofs = hashes
            .iter()
            .map(|h| f.processor.db().get_tx_proof(h).unwrap().unwrap())
            .collect();
        let join = f.order(
            target_id.clone(),
            TxAttributes::Join(JoinAttributes {
                burn_proofs,
                counter: 0,
            }),
        );
        f.apply_ok(vec![join]);

        let joined = f.token(&target_id);
        assert_eq!(joined.amount, 33);
        assert_eq!(joined.counter, 1);
        assert!(f.processor.db().get_token(&a).unwrap().is_none());
        assert!(f.processor.db().get_token(&b).unwrap().is_none());
    }

    #[test]
    fn join_rejects_burns_against_stale_target_counter() {
        let mut f = Fixture::new();
        let ty = f.define_type(None, 0).unwrap();
        let target_id = f.mint(&ty, 10);
        let a = f.mint(&ty, 15);

        let burn = f.burn(&a, &f.token(&target_id));
        let hash = burn.hash().unwrap();
        let lock = f.order(
            target_id.clone(),
            TxAttributes::Lock(LockAttributes {
                lock_status: LockReason::CollectDust.code(),
                counter: 0,
            }),
        );
        f.apply_ok(vec![burn, lock]);

        let join = f.order(
            target_id.clone(),
            TxAttributes::Join(JoinAttributes {
                burn_proofs: vec![f.processor.db().get_tx_proof(&hash).unwrap().unwrap()],
                counter: 1,
            }),
        );
        let err = f
            .apply(vec![TransactionRecord::successful(join, 1)])
            .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidJoin { .. }));
        assert_eq!(f.token(&target_id).amount, 10);
        assert!(f.token(&a).burned);
    }

    #[test]
    fn burned_unit_cannot_be_locked() {
        let mut f = Fixture::new();
        let ty = f.define_type(None, 0).unwrap();
        let target_id = f.mint(&ty, 10);
        let a = f.mint(&ty, 5);

        let burn = f.burn(&a, &f.token(&target_id));
        f.apply_ok(vec![burn]);
        assert_eq!(f.token(&a).counter, 1);

        let lock = f.order(
            a.clone(),
            TxAttributes::Lock(LockAttributes {
                lock_status: LockReason::Manual.code(),
                counter: 1,
            }),
        );
        let err = f
            .apply(vec![TransactionRecord::successful(lock, 1)])
            .unwrap_err();
        assert!(matches!(err, ProcessError::UnitBurned(ref id) if id == &a));

        let burned = f.token(&a);
        assert!(burned.burned);
        assert!(!burned.is_locked());
        assert_eq!(burned.counter, 1);
    }
}
