//! # Tokens Wallet
//!
//! [`TokensWallet`] turns token lifecycle requests into signed transactions
//! and hands them to the [`Submitter`]. It owns no state of its own: unit
//! state is read through the injected [`RpcClient`] on every call, so two
//! wallets over the same partition never disagree for longer than a block.
//!
//! ## Operation pipeline
//!
//! ```text
//! request
//!   │ 1. validate metadata, tags, amounts       (no I/O)
//!   │ 2. resolve the acting account's key       (PredicateResolver)
//!   │ 3. read units / type hierarchy            (RpcClient)
//!   │ 4. select units                           (UnitSelector)
//!   │ 5. ensure fee credit for N transactions   (FeeManager)
//!   │ 6. build + sign, type proofs root-first   (TxBuilder)
//!   ▼ 7. send, optionally wait for the proof    (Submitter)
//! ```
//!
//! ## Accumulating transfers
//!
//! When no single unit covers a fungible transfer, the first selected unit
//! becomes the join target. The other selected units are burned against its
//! ID and counter, the burns are confirmed, and their proofs are joined into
//! the target. The joined unit is then transferred whole if it holds exactly
//! the amount, or split otherwise. The receiver always gets exactly the
//! requested amount and any overshoot stays with the sender as the split's
//! remainder.
//!
//! ## Dust collection
//!
//! Per account and fungible type with at least two spendable units: lock the
//! largest unit with [`LockReason::CollectDust`], burn the rest against its
//! post-lock counter, and join. The join releases the lock.
//!
//! An interrupted run leaves its target locked with `CollectDust`, or leaves
//! burned units whose burns still match their target's counter. The next run
//! picks both up: the locked unit is the target again without a new lock,
//! and the outstanding burn proofs go into its join. A target with nothing
//! left to join is unlocked.
//!
//! ## Failed transactions
//!
//! A confirmed transaction may have executed as a failure, paying only its
//! fee. Every confirmed step is checked, and the first failure ends the
//! operation with [`WalletError::TransactionFailed`] before anything is built
//! on top of it.

pub mod validation;

pub use validation::ValidationError;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, WalletConfig};
use crate::crypto::keys::{AccountKey, AccountKeyProvider, PublicKey};
use crate::predicate::{
    compose_type_proofs, templates, PredicateError, PredicateInput, PredicateResolver,
};
use crate::rpc::{FeeError, FeeManager, RpcClient, RpcError};
use crate::selector::{Selection, SelectionError, UnitSelector};
use crate::submit::{Cancellation, SubmissionBatch, SubmitError, Submitter, TxSubmission};
use crate::transaction::{
    BurnAttributes, DefineFungibleTypeAttributes, DefineNftTypeAttributes, EncodingError,
    JoinAttributes, LockAttributes, MintFungibleAttributes, MintNftAttributes, SplitAttributes,
    TransactionOrder, TransferFungibleAttributes, TransferNftAttributes, TxAttributes, TxBuilder,
    TxHash, TxProof, UnlockAttributes, UpdateNftAttributes,
};
use crate::unit::{
    Icon, LockReason, TokenId, TokenKind, TokenTypeUnit, TokenUnit, TypeId, UnitId,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by [`TokensWallet`] operations.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Predicate(#[from] PredicateError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("token type {0} not found")]
    TypeNotFound(TypeId),

    #[error("token {0} not found")]
    TokenNotFound(TokenId),

    #[error("token {0} is locked")]
    TokenLocked(TokenId),

    #[error("token {0} is not locked")]
    TokenNotLocked(TokenId),

    /// A confirmed submission came back without its proof.
    #[error("no proof for confirmed transaction on {0}")]
    MissingProof(UnitId),

    /// The partition executed the transaction as a failure.
    #[error("transaction 0x{} on {unit_id} failed", hex::encode(.tx_hash))]
    TransactionFailed { unit_id: UnitId, tx_hash: TxHash },
}

// ---------------------------------------------------------------------------
// Requests & results
// ---------------------------------------------------------------------------

/// A new fungible token type.
#[derive(Debug, Clone)]
pub struct FungibleTypeParams {
    /// Explicit type ID; random when `None`.
    pub type_id: Option<TypeId>,
    pub symbol: String,
    pub name: String,
    pub icon: Icon,
    pub parent_type_id: Option<TypeId>,
    pub decimal_places: u32,
    pub sub_type_creation_predicate: Vec<u8>,
    pub token_minting_predicate: Vec<u8>,
    pub token_type_owner_predicate: Vec<u8>,
}

impl FungibleTypeParams {
    /// A root type whose predicates are all always-true.
    pub fn new(symbol: impl Into<String>, decimal_places: u32) -> Self {
        Self {
            type_id: None,
            symbol: symbol.into(),
            name: String::new(),
            icon: Icon::default(),
            parent_type_id: None,
            decimal_places,
            sub_type_creation_predicate: templates::always_true(),
            token_minting_predicate: templates::always_true(),
            token_type_owner_predicate: templates::always_true(),
        }
    }
}

/// A new NFT type.
#[derive(Debug, Clone)]
pub struct NftTypeParams {
    pub type_id: Option<TypeId>,
    pub symbol: String,
    pub name: String,
    pub icon: Icon,
    pub parent_type_id: Option<TypeId>,
    pub sub_type_creation_predicate: Vec<u8>,
    pub token_minting_predicate: Vec<u8>,
    pub token_type_owner_predicate: Vec<u8>,
    pub data_update_predicate: Vec<u8>,
}

impl NftTypeParams {
    /// A root type whose predicates are all always-true.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            type_id: None,
            symbol: symbol.into(),
            name: String::new(),
            icon: Icon::default(),
            parent_type_id: None,
            sub_type_creation_predicate: templates::always_true(),
            token_minting_predicate: templates::always_true(),
            token_type_owner_predicate: templates::always_true(),
            data_update_predicate: templates::always_true(),
        }
    }
}

/// A new NFT.
#[derive(Debug, Clone)]
pub struct NftParams {
    pub type_id: TypeId,
    /// Explicit token ID; random when `None`.
    pub token_id: Option<TokenId>,
    pub owner: Vec<u8>,
    pub name: String,
    pub uri: String,
    pub data: Vec<u8>,
    pub data_update_predicate: Vec<u8>,
}

/// What an operation sent.
#[derive(Debug, Clone, Default)]
pub struct SubmissionResult {
    pub submissions: Vec<TxSubmission>,
    /// Actual fees of the confirmed submissions.
    pub fee_sum: u64,
}

impl SubmissionResult {
    fn new(submissions: Vec<TxSubmission>) -> Self {
        let mut result = Self::default();
        for submission in submissions {
            result.push(submission);
        }
        result
    }

    fn push(&mut self, submission: TxSubmission) {
        if let Some(proof) = &submission.proof {
            self.fee_sum = self
                .fee_sum
                .saturating_add(proof.record.server_metadata.actual_fee);
        }
        self.submissions.push(submission);
    }

    fn extend(&mut self, other: SubmissionResult) {
        for submission in other.submissions {
            self.push(submission);
        }
    }

    /// True when every submission has its proof.
    pub fn confirmed(&self) -> bool {
        self.submissions.iter().all(TxSubmission::confirmed)
    }
}

/// One join performed by [`TokensWallet::collect_dust`].
#[derive(Debug, Clone)]
pub struct DustCollectionResult {
    pub account_number: u64,
    pub type_id: TypeId,
    /// The unit everything was joined into.
    pub token_id: TokenId,
    /// Amount the joined unit holds afterwards.
    pub amount: u64,
    /// Number of units burned into it.
    pub folded_units: usize,
    pub result: SubmissionResult,
}

/// The owner predicate for a receiver: always-true when `None`, otherwise
/// P2PKH over the key's hash.
pub fn receiver_predicate(receiver: Option<&PublicKey>) -> Vec<u8> {
    match receiver {
        Some(key) => templates::p2pkh(&key.key_hash()),
        None => templates::always_true(),
    }
}

// ---------------------------------------------------------------------------
// TokensWallet
// ---------------------------------------------------------------------------

/// Token lifecycle operations on behalf of a set of accounts.
///
/// Account numbers are one-based, as in predicate clauses. Where an
/// operation accepts `0` it means every account.
pub struct TokensWallet {
    config: WalletConfig,
    rpc: Arc<dyn RpcClient>,
    fees: Arc<dyn FeeManager>,
    resolver: PredicateResolver,
    submitter: Submitter,
    cancel: Cancellation,
}

impl TokensWallet {
    pub fn new(
        config: WalletConfig,
        rpc: Arc<dyn RpcClient>,
        fees: Arc<dyn FeeManager>,
        keys: Arc<dyn AccountKeyProvider>,
    ) -> Result<Self, WalletError> {
        config.validate()?;
        let submitter = Submitter::new(rpc.clone(), config.confirmation_poll_interval());
        Ok(Self {
            config,
            rpc,
            fees,
            resolver: PredicateResolver::new(keys),
            submitter,
            cancel: Cancellation::never(),
        })
    }

    /// Abandons confirmation waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Resolver over this wallet's accounts, for turning clause and argument
    /// strings into predicates and inputs.
    pub fn resolver(&self) -> &PredicateResolver {
        &self.resolver
    }

    // -- Token types --------------------------------------------------------

    /// Defines a fungible token type. `sub_type_inputs` satisfy the parent
    /// chain's sub-type creation predicates, root first.
    pub async fn new_fungible_type(
        &self,
        account_number: u64,
        params: FungibleTypeParams,
        sub_type_inputs: &[PredicateInput],
    ) -> Result<(TypeId, SubmissionResult), WalletError> {
        validation::validate_type_metadata(&params.symbol, &params.name, &params.icon)?;
        validation::validate_decimal_places(params.decimal_places)?;
        let type_id = params
            .type_id
            .unwrap_or_else(|| UnitId::random(TokenKind::Fungible.type_tag()));
        validation::check_type_id(&type_id, TokenKind::Fungible)?;
        if let Some(parent) = &params.parent_type_id {
            validation::check_type_id(parent, TokenKind::Fungible)?;
        }
        let key = self.resolver.account_key(account_number)?;

        self.ensure_type_unused(&type_id).await?;
        let parents = self
            .parent_chain(params.parent_type_id.as_ref(), TokenKind::Fungible)
            .await?;
        if let Some(parent) = parents.first() {
            if parent.decimal_places != params.decimal_places {
                return Err(ValidationError::ParentDecimalsMismatch {
                    value: params.decimal_places,
                    parent: parent.decimal_places,
                }
                .into());
            }
        }
        let type_proofs = compose_type_proofs(sub_type_inputs, parents.len())?;

        let fcr_id = self.fees.ensure_fee_credit(&key, 1).await?;
        let attributes = TxAttributes::DefineFungibleType(DefineFungibleTypeAttributes {
            symbol: params.symbol,
            name: params.name,
            icon: params.icon,
            parent_type_id: params.parent_type_id,
            decimal_places: params.decimal_places,
            sub_type_creation_predicate: params.sub_type_creation_predicate,
            token_minting_predicate: params.token_minting_predicate,
            token_type_owner_predicate: params.token_type_owner_predicate,
        });
        let tx = self
            .build(&fcr_id, type_id.clone(), attributes, &PredicateInput::Key(key), &type_proofs)
            .await?;
        let result = self.submit(tx).await?;
        info!(type_id = %type_id, account_number, "fungible token type defined");
        Ok((type_id, result))
    }

    /// Defines an NFT type. `sub_type_inputs` as for
    /// [`new_fungible_type`](Self::new_fungible_type).
    pub async fn new_nft_type(
        &self,
        account_number: u64,
        params: NftTypeParams,
        sub_type_inputs: &[PredicateInput],
    ) -> Result<(TypeId, SubmissionResult), WalletError> {
        validation::validate_type_metadata(&params.symbol, &params.name, &params.icon)?;
        let type_id = params
            .type_id
            .unwrap_or_else(|| UnitId::random(TokenKind::NonFungible.type_tag()));
        validation::check_type_id(&type_id, TokenKind::NonFungible)?;
        if let Some(parent) = &params.parent_type_id {
            validation::check_type_id(parent, TokenKind::NonFungible)?;
        }
        let key = self.resolver.account_key(account_number)?;

        self.ensure_type_unused(&type_id).await?;
        let parents = self
            .parent_chain(params.parent_type_id.as_ref(), TokenKind::NonFungible)
            .await?;
        let type_proofs = compose_type_proofs(sub_type_inputs, parents.len())?;

        let fcr_id = self.fees.ensure_fee_credit(&key, 1).await?;
        let attributes = TxAttributes::DefineNftType(DefineNftTypeAttributes {
            symbol: params.symbol,
            name: params.name,
            icon: params.icon,
            parent_type_id: params.parent_type_id,
            sub_type_creation_predicate: params.sub_type_creation_predicate,
            token_minting_predicate: params.token_minting_predicate,
            token_type_owner_predicate: params.token_type_owner_predicate,
            data_update_predicate: params.data_update_predicate,
        });
        let tx = self
            .build(&fcr_id, type_id.clone(), attributes, &PredicateInput::Key(key), &type_proofs)
            .await?;
        let result = self.submit(tx).await?;
        info!(type_id = %type_id, account_number, "NFT type defined");
        Ok((type_id, result))
    }

    // -- Minting ------------------------------------------------------------

    /// Mints `amount` of `type_id` to `owner`. `minting_inputs` satisfy the
    /// type chain's minting predicates, root first.
    pub async fn new_fungible_token(
        &self,
        account_number: u64,
        type_id: &TypeId,
        amount: u64,
        owner: Vec<u8>,
        minting_inputs: &[PredicateInput],
    ) -> Result<(TokenId, SubmissionResult), WalletError> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        validation::check_type_id(type_id, TokenKind::Fungible)?;
        let key = self.resolver.account_key(account_number)?;

        let chain = self.type_chain(type_id).await?;
        let type_proofs = compose_type_proofs(minting_inputs, chain.len())?;
        let token_id = UnitId::random(TokenKind::Fungible.token_tag());

        let fcr_id = self.fees.ensure_fee_credit(&key, 1).await?;
        let attributes = TxAttributes::MintFungible(MintFungibleAttributes {
            type_id: type_id.clone(),
            owner,
            value: amount,
        });
        let tx = self
            .build(&fcr_id, token_id.clone(), attributes, &PredicateInput::Key(key), &type_proofs)
            .await?;
        let result = self.submit(tx).await?;
        info!(token_id = %token_id, type_id = %type_id, amount, "fungible token minted");
        Ok((token_id, result))
    }

    /// Mints an NFT. `minting_inputs` as for
    /// [`new_fungible_token`](Self::new_fungible_token).
    pub async fn new_nft(
        &self,
        account_number: u64,
        params: NftParams,
        minting_inputs: &[PredicateInput],
    ) -> Result<(TokenId, SubmissionResult), WalletError> {
        validation::validate_nft_metadata(&params.name, &params.uri, &params.data)?;
        validation::check_type_id(&params.type_id, TokenKind::NonFungible)?;
        let explicit_id = params.token_id.is_some();
        let token_id = params
            .token_id
            .unwrap_or_else(|| UnitId::random(TokenKind::NonFungible.token_tag()));
        validation::check_token_id(&token_id, TokenKind::NonFungible)?;
        let key = self.resolver.account_key(account_number)?;

        if explicit_id && self.rpc.get_token(&token_id).await?.is_some() {
            return Err(ValidationError::UnitIdInUse(token_id).into());
        }
        let chain = self.type_chain(&params.type_id).await?;
        let type_proofs = compose_type_proofs(minting_inputs, chain.len())?;

        let fcr_id = self.fees.ensure_fee_credit(&key, 1).await?;
        let attributes = TxAttributes::MintNft(MintNftAttributes {
            type_id: params.type_id.clone(),
            owner: params.owner,
            name: params.name,
            uri: params.uri,
            data: params.data,
            data_update_predicate: params.data_update_predicate,
        });
        let tx = self
            .build(&fcr_id, token_id.clone(), attributes, &PredicateInput::Key(key), &type_proofs)
            .await?;
        let result = self.submit(tx).await?;
        info!(token_id = %token_id, type_id = %params.type_id, "NFT minted");
        Ok((token_id, result))
    }

    // -- Transfers ----------------------------------------------------------

    /// Sends exactly `amount` of `type_id` from the account's units to
    /// `receiver`. `type_owner_inputs` satisfy the type chain's owner
    /// predicates, root first.
    pub async fn send_fungible(
        &self,
        account_number: u64,
        type_id: &TypeId,
        amount: u64,
        receiver: Option<&PublicKey>,
        type_owner_inputs: &[PredicateInput],
    ) -> Result<SubmissionResult, WalletError> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        validation::check_type_id(type_id, TokenKind::Fungible)?;
        let key = self.resolver.account_key(account_number)?;

        let tokens = self
            .rpc
            .get_tokens(Some(TokenKind::Fungible), &key.pub_key_hash())
            .await?;
        let selection = UnitSelector::new(&tokens).select(type_id, amount)?;
        let chain = self.type_chain(type_id).await?;
        let type_proofs = compose_type_proofs(type_owner_inputs, chain.len())?;
        let new_owner = receiver_predicate(receiver);
        let owner = PredicateInput::Key(key.clone());

        match selection {
            Selection::Transfer(unit) | Selection::Split(unit) => {
                let fcr_id = self.fees.ensure_fee_credit(&key, 1).await?;
                let tx = self
                    .pay_with(&fcr_id, &unit, amount, new_owner, &owner, &type_proofs)
                    .await?;
                self.submit(tx).await
            }
            Selection::Accumulate(units) => {
                let Some((target, others)) = units.split_first() else {
                    return Err(SelectionError::InsufficientTokens {
                        available: 0,
                        required: amount,
                    }
                    .into());
                };
                // burns + join + final transfer or split
                let fcr_id = self
                    .fees
                    .ensure_fee_credit(&key, others.len() as u64 + 2)
                    .await?;
                let (joined, mut result) = self
                    .fold_into(&fcr_id, &owner, &type_proofs, target, others, Vec::new())
                    .await?;
                let tx = self
                    .pay_with(&fcr_id, &joined, amount, new_owner, &owner, &type_proofs)
                    .await?;
                result.extend(self.submit(tx).await?);
                Ok(result)
            }
        }
    }

    /// Transfers an NFT to `receiver`.
    pub async fn transfer_nft(
        &self,
        account_number: u64,
        token_id: &TokenId,
        receiver: Option<&PublicKey>,
        type_owner_inputs: &[PredicateInput],
    ) -> Result<SubmissionResult, WalletError> {
        validation::check_token_id(token_id, TokenKind::NonFungible)?;
        let key = self.resolver.account_key(account_number)?;

        let token = self.unlocked_token(token_id).await?;
        let chain = self.type_chain(&token.type_id).await?;
        let type_proofs = compose_type_proofs(type_owner_inputs, chain.len())?;

        let fcr_id = self.fees.ensure_fee_credit(&key, 1).await?;
        let attributes = TxAttributes::TransferNft(TransferNftAttributes {
            type_id: token.type_id.clone(),
            new_owner: receiver_predicate(receiver),
            counter: token.counter,
        });
        let tx = self
            .build(&fcr_id, token.id, attributes, &PredicateInput::Key(key), &type_proofs)
            .await?;
        self.submit(tx).await
    }

    /// Replaces an NFT's data. `data_update_inputs` satisfy the type chain's
    /// data update predicates root first, followed by the token's own.
    pub async fn update_nft_data(
        &self,
        account_number: u64,
        token_id: &TokenId,
        data: Vec<u8>,
        data_update_inputs: &[PredicateInput],
    ) -> Result<SubmissionResult, WalletError> {
        validation::validate_nft_data(&data)?;
        validation::check_token_id(token_id, TokenKind::NonFungible)?;
        let key = self.resolver.account_key(account_number)?;

        let token = self.unlocked_token(token_id).await?;
        let chain = self.type_chain(&token.type_id).await?;
        let type_proofs = compose_type_proofs(data_update_inputs, chain.len() + 1)?;

        let fcr_id = self.fees.ensure_fee_credit(&key, 1).await?;
        let attributes = TxAttributes::UpdateNft(UpdateNftAttributes {
            data,
            counter: token.counter,
        });
        // Authorized entirely by the data update chain; no owner proof.
        let tx = self
            .build(&fcr_id, token.id, attributes, &PredicateInput::nil(), &type_proofs)
            .await?;
        self.submit(tx).await
    }

    // -- Locking ------------------------------------------------------------

    /// Locks a token so it cannot be spent until unlocked.
    pub async fn lock_token(
        &self,
        account_number: u64,
        token_id: &TokenId,
    ) -> Result<SubmissionResult, WalletError> {
        check_any_token_id(token_id)?;
        let key = self.resolver.account_key(account_number)?;
        let token = self.unlocked_token(token_id).await?;

        let fcr_id = self.fees.ensure_fee_credit(&key, 1).await?;
        let tx = self
            .lock_tx(&fcr_id, &token, LockReason::Manual, &PredicateInput::Key(key))
            .await?;
        self.submit(tx).await
    }

    pub async fn unlock_token(
        &self,
        account_number: u64,
        token_id: &TokenId,
    ) -> Result<SubmissionResult, WalletError> {
        check_any_token_id(token_id)?;
        let key = self.resolver.account_key(account_number)?;
        let token = self.token(token_id).await?;
        if !token.is_locked() {
            return Err(WalletError::TokenNotLocked(token.id));
        }

        let fcr_id = self.fees.ensure_fee_credit(&key, 1).await?;
        let attributes = TxAttributes::Unlock(UnlockAttributes {
            counter: token.counter,
        });
        let tx = self
            .build(&fcr_id, token.id, attributes, &PredicateInput::Key(key), &[])
            .await?;
        self.submit(tx).await
    }

    // -- Dust collection ----------------------------------------------------

    /// Joins each account's small units, per type. `account_number == 0`
    /// collects for every account. Always waits for every step.
    pub async fn collect_dust(
        &self,
        account_number: u64,
        type_owner_inputs: &[PredicateInput],
    ) -> Result<Vec<DustCollectionResult>, WalletError> {
        let mut results = Vec::new();
        for number in self.account_numbers(account_number) {
            let key = self.resolver.account_key(number)?;
            let tokens = self
                .rpc
                .get_tokens(Some(TokenKind::Fungible), &key.pub_key_hash())
                .await?;
            let mut pending = self.pending_burns(&tokens).await?;
            let mut groups = UnitSelector::new(&tokens).dust_groups(self.config.dust_max_units);
            for target_id in pending.keys() {
                let Some(target) = tokens.iter().find(|t| &t.id == target_id) else {
                    continue;
                };
                let group = groups.entry(target.type_id.clone()).or_default();
                if group.first().is_some_and(|first| {
                    first.id != target.id && first.lock_status == LockReason::CollectDust.code()
                }) {
                    continue;
                }
                group.retain(|u| u.id != target.id);
                group.insert(0, target.clone());
            }
            if groups.is_empty() {
                debug!(account_number = number, "no dust to collect");
            }

            for (type_id, units) in groups {
                let Some((target, others)) = units.split_first() else {
                    continue;
                };
                let burned = pending.remove(&target.id).unwrap_or_default();
                let folded_units = others.len() + burned.len();
                let (amount, result) = self
                    .collect_type_dust(&key, &type_id, target, others, burned, type_owner_inputs)
                    .await?;
                info!(
                    account_number = number,
                    type_id = %type_id,
                    token_id = %target.id,
                    folded = folded_units,
                    amount,
                    "dust collected"
                );
                results.push(DustCollectionResult {
                    account_number: number,
                    type_id,
                    token_id: target.id.clone(),
                    amount,
                    folded_units,
                    result,
                });
            }
        }
        Ok(results)
    }

    async fn collect_type_dust(
        &self,
        key: &AccountKey,
        type_id: &TypeId,
        target: &TokenUnit,
        others: &[TokenUnit],
        burned: Vec<TxProof>,
        type_owner_inputs: &[PredicateInput],
    ) -> Result<(u64, SubmissionResult), WalletError> {
        let chain = self.type_chain(type_id).await?;
        let type_proofs = compose_type_proofs(type_owner_inputs, chain.len())?;
        let owner = PredicateInput::Key(key.clone());
        let resumed = target.lock_status == LockReason::CollectDust.code();

        if others.is_empty() && burned.is_empty() {
            // left locked by an earlier run with nothing to join
            let fcr_id = self.fees.ensure_fee_credit(key, 1).await?;
            let attributes = TxAttributes::Unlock(UnlockAttributes {
                counter: target.counter,
            });
            let unlock = self
                .build(&fcr_id, target.id.clone(), attributes, &owner, &[])
                .await?;
            let unlock = confirmed_successful(
                self.submitter.send_and_confirm(unlock, &self.cancel).await?,
            )?;
            return Ok((target.amount, SubmissionResult::new(vec![unlock])));
        }

        // Locking would move the counter that outstanding burns point at.
        let lock_first = !resumed && burned.is_empty();
        // lock + burns + join
        let tx_count = others.len() as u64 + 1 + u64::from(lock_first);
        let fcr_id = self.fees.ensure_fee_credit(key, tx_count).await?;

        let mut result = SubmissionResult::default();
        let mut join_target = target.clone();
        if lock_first {
            let lock = self
                .lock_tx(&fcr_id, target, LockReason::CollectDust, &owner)
                .await?;
            let lock =
                confirmed_successful(self.submitter.send_and_confirm(lock, &self.cancel).await?)?;
            result.push(lock);
            join_target.counter += 1;
            join_target.lock_status = LockReason::CollectDust.code();
        } else {
            debug!(
                unit_id = %target.id,
                outstanding_burns = burned.len(),
                "resuming dust collection"
            );
        }

        let (joined, folded) = self
            .fold_into(&fcr_id, &owner, &type_proofs, &join_target, others, burned)
            .await?;
        result.extend(folded);
        Ok((joined.amount, result))
    }

    // -- Queries ------------------------------------------------------------

    /// Tokens per account number. `account_number == 0` lists every account.
    pub async fn list_tokens(
        &self,
        account_number: u64,
        kind: Option<TokenKind>,
    ) -> Result<BTreeMap<u64, Vec<TokenUnit>>, WalletError> {
        let mut tokens = BTreeMap::new();
        for number in self.account_numbers(account_number) {
            let key = self.resolver.account_key(number)?;
            tokens.insert(number, self.rpc.get_tokens(kind, &key.pub_key_hash()).await?);
        }
        Ok(tokens)
    }

    /// Token types created by the account, or every known type when
    /// `account_number == 0`.
    pub async fn list_token_types(
        &self,
        account_number: u64,
        kind: Option<TokenKind>,
    ) -> Result<Vec<TokenTypeUnit>, WalletError> {
        if account_number == 0 {
            return Ok(self.rpc.get_token_types(kind, None).await?);
        }
        let creator = self.resolver.account_key(account_number)?.public_key();
        Ok(self.rpc.get_token_types(kind, Some(&creator)).await?)
    }

    pub async fn get_token(&self, token_id: &TokenId) -> Result<Option<TokenUnit>, WalletError> {
        Ok(self.rpc.get_token(token_id).await?)
    }

    // -- Internals ----------------------------------------------------------

    fn account_numbers(&self, account_number: u64) -> Vec<u64> {
        if account_number == 0 {
            (1..=self.resolver.account_count()).collect()
        } else {
            vec![account_number]
        }
    }

    /// Signs an order that times out `tx_timeout_rounds` after the current
    /// round.
    async fn build(
        &self,
        fcr_id: &UnitId,
        unit_id: UnitId,
        attributes: TxAttributes,
        owner: &PredicateInput,
        type_proofs: &[PredicateInput],
    ) -> Result<TransactionOrder, WalletError> {
        let round = self.rpc.get_round_number().await?;
        let tx = TxBuilder::new(self.config.partition_id, unit_id, attributes)
            .timeout_round(round.saturating_add(self.config.tx_timeout_rounds))
            .max_fee(self.config.max_fee)
            .fee_credit_record_id(fcr_id.clone())
            .sign(owner, type_proofs)?;
        Ok(tx)
    }

    /// Sends, and waits when the configuration asks for it.
    async fn submit(&self, tx: TransactionOrder) -> Result<SubmissionResult, WalletError> {
        let submission = if self.config.confirm_transactions {
            confirmed_successful(self.submitter.send_and_confirm(tx, &self.cancel).await?)?
        } else {
            self.submitter.send(tx).await?
        };
        Ok(SubmissionResult::new(vec![submission]))
    }

    /// Transfers `unit` whole when it holds exactly `amount`, otherwise
    /// splits `amount` off it.
    async fn pay_with(
        &self,
        fcr_id: &UnitId,
        unit: &TokenUnit,
        amount: u64,
        new_owner: Vec<u8>,
        owner: &PredicateInput,
        type_proofs: &[PredicateInput],
    ) -> Result<TransactionOrder, WalletError> {
        let attributes = if unit.amount == amount {
            debug!(unit_id = %unit.id, amount, "transferring whole unit");
            TxAttributes::TransferFungible(TransferFungibleAttributes {
                type_id: unit.type_id.clone(),
                value: unit.amount,
                new_owner,
                counter: unit.counter,
            })
        } else {
            debug!(unit_id = %unit.id, amount, remaining = unit.amount - amount, "splitting unit");
            TxAttributes::Split(SplitAttributes {
                type_id: unit.type_id.clone(),
                target_value: amount,
                new_owner,
                remaining_value: unit.amount - amount,
                counter: unit.counter,
            })
        };
        self.build(fcr_id, unit.id.clone(), attributes, owner, type_proofs)
            .await
    }

    /// Burns `others` against `target`, waits for the burns, then joins
    /// them into `target` together with the already confirmed `burned`, and
    /// waits for the join. Returns `target` as it stands after the join.
    async fn fold_into(
        &self,
        fcr_id: &UnitId,
        owner: &PredicateInput,
        type_proofs: &[PredicateInput],
        target: &TokenUnit,
        others: &[TokenUnit],
        burned: Vec<TxProof>,
    ) -> Result<(TokenUnit, SubmissionResult), WalletError> {
        let mut batch = SubmissionBatch::new();
        let mut folded = burned
            .iter()
            .fold(0u64, |sum, proof| sum.saturating_add(burned_value(proof)));
        let burned_units = burned.len();
        for unit in others {
            let attributes = TxAttributes::Burn(BurnAttributes {
                type_id: unit.type_id.clone(),
                value: unit.amount,
                target_token_id: target.id.clone(),
                target_token_counter: target.counter,
                counter: unit.counter,
            });
            batch.add(
                self.build(fcr_id, unit.id.clone(), attributes, owner, type_proofs)
                    .await?,
            )?;
            folded = folded.saturating_add(unit.amount);
        }
        if !batch.is_empty() {
            batch.send_all(&self.submitter).await?;
            batch.confirm_all(&self.submitter, &self.cancel).await?;
        }
        let burns = batch.into_submissions();

        let mut burn_proofs = burned;
        for burn in &burns {
            check_succeeded(burn)?;
            let proof = burn
                .proof
                .clone()
                .ok_or_else(|| WalletError::MissingProof(burn.unit_id.clone()))?;
            burn_proofs.push(proof);
        }
        let attributes = TxAttributes::Join(JoinAttributes {
            burn_proofs,
            counter: target.counter,
        });
        let join = self
            .build(fcr_id, target.id.clone(), attributes, owner, type_proofs)
            .await?;
        let join =
            confirmed_successful(self.submitter.send_and_confirm(join, &self.cancel).await?)?;
        debug!(
            unit_id = %target.id,
            burned = others.len() + burned_units,
            folded,
            "units joined"
        );

        let mut joined = target.clone();
        joined.amount = joined.amount.saturating_add(folded);
        joined.counter += 1;
        joined.lock_status = 0;

        let mut result = SubmissionResult::new(burns);
        result.push(join);
        Ok((joined, result))
    }

    /// Successful burns of the account's burned units that can still be
    /// joined, keyed by the unit they were burned into. A burn whose target
    /// has moved past the burned-against counter is lost and skipped.
    async fn pending_burns(
        &self,
        tokens: &[TokenUnit],
    ) -> Result<BTreeMap<TokenId, Vec<TxProof>>, WalletError> {
        let mut pending: BTreeMap<TokenId, Vec<TxProof>> = BTreeMap::new();
        for unit in tokens.iter().filter(|t| t.is_fungible() && t.burned) {
            let Some(proof) = self.rpc.get_transaction_proof(&unit.tx_hash).await? else {
                continue;
            };
            let TxAttributes::Burn(burn) = proof.record.order.attributes() else {
                continue;
            };
            if !proof.record.is_successful() {
                continue;
            }
            let joinable = tokens.iter().any(|t| {
                t.id == burn.target_token_id
                    && !t.burned
                    && t.counter == burn.target_token_counter
                    && (!t.is_locked() || t.lock_status == LockReason::CollectDust.code())
            });
            if !joinable {
                warn!(
                    unit_id = %unit.id,
                    target = %burn.target_token_id,
                    "burn can no longer be joined"
                );
                continue;
            }
            pending
                .entry(burn.target_token_id.clone())
                .or_default()
                .push(proof);
        }
        Ok(pending)
    }

    async fn lock_tx(
        &self,
        fcr_id: &UnitId,
        token: &TokenUnit,
        reason: LockReason,
        owner: &PredicateInput,
    ) -> Result<TransactionOrder, WalletError> {
        let attributes = TxAttributes::Lock(LockAttributes {
            lock_status: reason.code(),
            counter: token.counter,
        });
        self.build(fcr_id, token.id.clone(), attributes, owner, &[])
            .await
    }

    async fn token(&self, token_id: &TokenId) -> Result<TokenUnit, WalletError> {
        self.rpc
            .get_token(token_id)
            .await?
            .ok_or_else(|| WalletError::TokenNotFound(token_id.clone()))
    }

    async fn unlocked_token(&self, token_id: &TokenId) -> Result<TokenUnit, WalletError> {
        let token = self.token(token_id).await?;
        if token.is_locked() {
            return Err(WalletError::TokenLocked(token.id));
        }
        Ok(token)
    }

    /// The type's chain, leaf first. Fails when the type is unknown.
    async fn type_chain(&self, type_id: &TypeId) -> Result<Vec<TokenTypeUnit>, WalletError> {
        let chain = self.rpc.get_type_hierarchy(type_id).await?;
        if chain.is_empty() {
            return Err(WalletError::TypeNotFound(type_id.clone()));
        }
        Ok(chain)
    }

    /// The parent's chain, leaf first; empty for a root type.
    async fn parent_chain(
        &self,
        parent: Option<&TypeId>,
        kind: TokenKind,
    ) -> Result<Vec<TokenTypeUnit>, WalletError> {
        let Some(parent) = parent else {
            return Ok(Vec::new());
        };
        let chain = self.type_chain(parent).await?;
        if chain[0].kind != kind {
            return Err(ValidationError::ParentKindMismatch {
                parent: parent.clone(),
                kind,
            }
            .into());
        }
        Ok(chain)
    }

    async fn ensure_type_unused(&self, type_id: &TypeId) -> Result<(), WalletError> {
        if !self.rpc.get_type_hierarchy(type_id).await?.is_empty() {
            return Err(ValidationError::UnitIdInUse(type_id.clone()).into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for TokensWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokensWallet")
            .field("config", &self.config)
            .field("accounts", &self.resolver.account_count())
            .finish()
    }
}

/// Passes a confirmed submission through unless it executed as a failure.
fn confirmed_successful(submission: TxSubmission) -> Result<TxSubmission, WalletError> {
    check_succeeded(&submission)?;
    Ok(submission)
}

fn check_succeeded(submission: &TxSubmission) -> Result<(), WalletError> {
    if submission.failed() {
        warn!(unit_id = %submission.unit_id, "transaction executed as failed");
        return Err(WalletError::TransactionFailed {
            unit_id: submission.unit_id.clone(),
            tx_hash: submission.tx_hash,
        });
    }
    Ok(())
}

fn burned_value(proof: &TxProof) -> u64 {
    match proof.record.order.attributes() {
        TxAttributes::Burn(burn) => burn.value,
        _ => 0,
    }
}

fn check_any_token_id(token_id: &TokenId) -> Result<(), ValidationError> {
    match TokenKind::from_token_id(token_id) {
        Some(_) => Ok(()),
        None => Err(ValidationError::InvalidUnitId {
            id: token_id.clone(),
            expected: "token",
        }),
    }
}
