//! In-process tokens partition for integration tests.
//!
//! [`MockPartition`] implements [`RpcClient`] on top of a temporary
//! [`WalletDb`]. Sent transactions queue up until somebody asks for the
//! round number; every such query advances the round and executes the queue,
//! one block per transaction, through the real [`BlockProcessor`]. A
//! transaction the processor rejects is retried as a `Failed` record (fee
//! only), and dropped if even that fails, exactly like a partition that
//! never includes it.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use token_wallet::config::WalletConfig;
use token_wallet::crypto::keys::{AccountKey, AccountKeyProvider, KeyRing, PubKeyHash, PublicKey};
use token_wallet::predicate::PredicateInput;
use token_wallet::rpc::{RecordFeeManager, RpcClient, RpcError};
use token_wallet::storage::{Block, BlockProcessor, WalletDb};
use token_wallet::transaction::{
    AddFeeCreditAttributes, LockAttributes, ServerMetadata, TransactionOrder, TransactionRecord,
    TxAttributes, TxBuilder, TxHash, TxProof, TxStatus,
};
use token_wallet::unit::{
    fee_credit_record_id, FeeCreditBill, LockReason, TokenId, TokenKind, TokenTypeUnit, TokenUnit,
    TypeId, UnitId,
};
use token_wallet::TokensWallet;

/// Actual fee charged for every executed transaction.
pub const ACTUAL_FEE: u64 = 1;

/// Fee credit every harness account starts with.
pub const INITIAL_FEE_CREDIT: u64 = 10_000;

// ---------------------------------------------------------------------------
// MockPartition
// ---------------------------------------------------------------------------

struct State {
    round: u64,
    executing: bool,
    pending: Vec<TransactionOrder>,
    sent: Vec<TransactionOrder>,
}

pub struct MockPartition {
    processor: BlockProcessor,
    state: Mutex<State>,
}

fn transport(e: impl Into<anyhow::Error>) -> RpcError {
    RpcError::Transport(e.into())
}

impl MockPartition {
    pub fn new() -> Arc<Self> {
        let db = WalletDb::open_temporary().expect("temp db");
        Arc::new(Self {
            processor: BlockProcessor::new(db),
            state: Mutex::new(State {
                round: 0,
                executing: true,
                pending: Vec::new(),
                sent: Vec::new(),
            }),
        })
    }

    pub fn db(&self) -> &WalletDb {
        self.processor.db()
    }

    pub fn processor(&self) -> &BlockProcessor {
        &self.processor
    }

    /// Stops (or resumes) executing queued transactions. Rounds keep
    /// advancing either way.
    pub fn set_executing(&self, executing: bool) {
        self.state.lock().executing = executing;
    }

    /// Every transaction ever sent, in order.
    pub fn sent(&self) -> Vec<TransactionOrder> {
        self.state.lock().sent.clone()
    }

    pub fn round(&self) -> u64 {
        self.state.lock().round
    }

    /// Queues `tx` as if another client had sent it. It executes on the next
    /// round query, ahead of anything sent later.
    pub fn queue(&self, tx: TransactionOrder) {
        let mut state = self.state.lock();
        state.pending.push(tx.clone());
        state.sent.push(tx);
    }

    /// Credits `amount` of fee credit to `key`'s record in its own block.
    pub fn fund(&self, key: &PublicKey, amount: u64) {
        let order = TxBuilder::new(
            2,
            fee_credit_record_id(key),
            TxAttributes::AddFeeCredit(AddFeeCreditAttributes {
                owner: token_wallet::predicate::templates::p2pkh(&key.key_hash()),
                transferred_amount: amount + ACTUAL_FEE,
                transfer_fee: 0,
            }),
        )
        .sign(&PredicateInput::nil(), &[])
        .expect("sign fee credit");

        let mut state = self.state.lock();
        state.round += 1;
        self.processor
            .process_block(&Block::new(
                state.round,
                vec![TransactionRecord::successful(order, ACTUAL_FEE)],
            ))
            .expect("fund fee credit");
    }

    fn tick(&self) -> u64 {
        let mut state = self.state.lock();
        state.round += 1;
        if state.executing {
            let pending = std::mem::take(&mut state.pending);
            for tx in pending {
                self.execute(&mut state, tx);
            }
        }
        state.round
    }

    fn execute(&self, state: &mut State, tx: TransactionOrder) {
        let failed = TransactionRecord {
            order: tx.clone(),
            server_metadata: ServerMetadata {
                actual_fee: ACTUAL_FEE,
                status: TxStatus::Failed,
            },
        };
        for record in [TransactionRecord::successful(tx, ACTUAL_FEE), failed] {
            if self
                .processor
                .process_block(&Block::new(state.round, vec![record]))
                .is_ok()
            {
                state.round += 1;
                return;
            }
        }
    }
}

#[async_trait]
impl RpcClient for MockPartition {
    async fn send_transaction(&self, tx: &TransactionOrder) -> Result<TxHash, RpcError> {
        let hash = tx.hash().map_err(transport)?;
        let mut state = self.state.lock();
        state.pending.push(tx.clone());
        state.sent.push(tx.clone());
        Ok(hash)
    }

    async fn get_transaction_proof(&self, tx_hash: &TxHash) -> Result<Option<TxProof>, RpcError> {
        self.db().get_tx_proof(tx_hash).map_err(transport)
    }

    async fn get_round_number(&self) -> Result<u64, RpcError> {
        Ok(self.tick())
    }

    async fn get_token(&self, id: &TokenId) -> Result<Option<TokenUnit>, RpcError> {
        self.db().get_token(id).map_err(transport)
    }

    async fn get_tokens(
        &self,
        kind: Option<TokenKind>,
        owner: &PubKeyHash,
    ) -> Result<Vec<TokenUnit>, RpcError> {
        self.db().tokens_by_owner(owner, kind).map_err(transport)
    }

    async fn get_token_types(
        &self,
        kind: Option<TokenKind>,
        creator: Option<&PublicKey>,
    ) -> Result<Vec<TokenTypeUnit>, RpcError> {
        self.db().token_types(kind, creator).map_err(transport)
    }

    async fn get_type_hierarchy(&self, id: &TypeId) -> Result<Vec<TokenTypeUnit>, RpcError> {
        self.db().type_hierarchy(id).map_err(transport)
    }

    async fn get_fee_credit_record(&self, id: &UnitId) -> Result<Option<FeeCreditBill>, RpcError> {
        self.db().get_fee_credit_bill(id).map_err(transport)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A wallet over a mock partition, with funded accounts.
pub struct Harness {
    pub partition: Arc<MockPartition>,
    pub keys: Arc<KeyRing>,
    pub wallet: TokensWallet,
}

impl Harness {
    /// Key of the one-based `account_number`.
    pub fn key(&self, account_number: u64) -> AccountKey {
        self.keys
            .account_key(account_number - 1)
            .expect("account exists")
    }

    pub fn pub_key(&self, account_number: u64) -> PublicKey {
        self.key(account_number).public_key()
    }

    /// Fungible units of `type_id` owned by the account, burned ones included.
    pub fn tokens(&self, account_number: u64, type_id: &TypeId) -> Vec<TokenUnit> {
        self.partition
            .db()
            .tokens_by_owner(&self.key(account_number).pub_key_hash(), Some(TokenKind::Fungible))
            .expect("db read")
            .into_iter()
            .filter(|t| &t.type_id == type_id)
            .collect()
    }

    /// Amounts of [`tokens`](Self::tokens), ascending.
    pub fn amounts(&self, account_number: u64, type_id: &TypeId) -> Vec<u64> {
        let mut amounts: Vec<u64> = self
            .tokens(account_number, type_id)
            .into_iter()
            .map(|t| t.amount)
            .collect();
        amounts.sort_unstable();
        amounts
    }

    /// Queues a manual lock of `token`, signed by the account, the way a
    /// second client of the same account would.
    pub fn queue_lock(&self, account_number: u64, token: &TokenUnit) {
        let key = self.key(account_number);
        let config = self.wallet.config();
        let order = TxBuilder::new(
            config.partition_id,
            token.id.clone(),
            TxAttributes::Lock(LockAttributes {
                lock_status: LockReason::Manual.code(),
                counter: token.counter,
            }),
        )
        .timeout_round(self.partition.round() + config.tx_timeout_rounds)
        .max_fee(config.max_fee)
        .fee_credit_record_id(fee_credit_record_id(&key.public_key()))
        .sign(&PredicateInput::Key(key), &[])
        .expect("sign lock");
        self.partition.queue(order);
    }

    pub fn fee_credit(&self, account_number: u64) -> u64 {
        self.partition
            .db()
            .get_fee_credit_bill(&fee_credit_record_id(&self.pub_key(account_number)))
            .expect("db read")
            .map_or(0, |bill| bill.balance)
    }
}

pub fn test_config() -> WalletConfig {
    WalletConfig {
        confirmation_poll_interval_ms: 10,
        ..WalletConfig::default()
    }
}

/// `accounts` deterministic accounts; the first `funded` of them get fee
/// credit.
pub fn harness_with(accounts: u8, funded: u8, config: WalletConfig) -> Harness {
    let seeds: Vec<[u8; 32]> = (1..=accounts).map(|i| [i; 32]).collect();
    let keys = Arc::new(KeyRing::from_seeds(&seeds));
    let partition = MockPartition::new();
    for index in 0..u64::from(funded) {
        let key = keys.account_key(index).expect("account exists");
        partition.fund(&key.public_key(), INITIAL_FEE_CREDIT);
    }

    let fees = Arc::new(RecordFeeManager::new(partition.clone(), config.max_fee));
    let wallet = TokensWallet::new(config, partition.clone(), fees, keys.clone())
        .expect("valid config");
    Harness {
        partition,
        keys,
        wallet,
    }
}

/// Three funded accounts with the test configuration.
pub fn harness() -> Harness {
    harness_with(3, 3, test_config())
}
