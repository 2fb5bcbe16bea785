//! # Submission & Confirmation
//!
//! Sends built orders to the partition and, when asked to, waits until the
//! partition has a proof for them.
//!
//! ## Confirmation
//!
//! Waiting is a bounded poll loop. Each iteration fetches the current round
//! and the proof for the transaction hash:
//!
//! 1. A proof exists: the transaction is confirmed.
//! 2. No proof, and the round has reached the transaction's timeout round:
//!    it can never execute, fail with [`SubmitError::TransactionTimedOut`].
//! 3. Otherwise sleep for the poll interval and try again.
//!
//! The sleep races a [`Cancellation`] signal the same way the node's
//! consensus loop races its shutdown channel. Cancelling only abandons the
//! wait; the transaction stays pending on the partition.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::rpc::{RpcClient, RpcError};
use crate::transaction::{EncodingError, TransactionOrder, TxHash, TxProof};
use crate::unit::UnitId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while submitting or confirming transactions.
#[derive(Debug)]
pub enum SubmitError {
    /// The order could not be hashed.
    Encoding(EncodingError),

    /// The partition could not be reached or refused the order.
    Rpc(RpcError),

    /// The partition passed the timeout round without executing the
    /// transaction. Safe to rebuild and resend.
    TransactionTimedOut { tx_hash: TxHash, timeout_round: u64 },

    /// The caller stopped waiting.
    Cancelled,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(e) => write!(f, "{}", e),
            Self::Rpc(e) => write!(f, "rpc error: {}", e),
            Self::TransactionTimedOut {
                tx_hash,
                timeout_round,
            } => write!(
                f,
                "transaction 0x{} timed out at round {}",
                hex::encode(tx_hash),
                timeout_round
            ),
            Self::Cancelled => write!(f, "confirmation wait cancelled"),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encoding(e) => Some(e),
            Self::Rpc(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EncodingError> for SubmitError {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}

impl From<RpcError> for SubmitError {
    fn from(e: RpcError) -> Self {
        Self::Rpc(e)
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Receiving side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

/// Sending side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// A linked cancel handle and signal.
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Cancellation {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. If the handle is dropped
    /// without cancelling, never resolves.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TxSubmission
// ---------------------------------------------------------------------------

/// One transaction on its way to the partition.
#[derive(Debug, Clone)]
pub struct TxSubmission {
    pub unit_id: UnitId,
    pub transaction: TransactionOrder,
    pub tx_hash: TxHash,
    /// Set once confirmed.
    pub proof: Option<TxProof>,
}

impl TxSubmission {
    pub fn new(transaction: TransactionOrder) -> Result<Self, EncodingError> {
        Ok(Self {
            unit_id: transaction.unit_id().clone(),
            tx_hash: transaction.hash()?,
            transaction,
            proof: None,
        })
    }

    pub fn confirmed(&self) -> bool {
        self.proof.is_some()
    }

    /// Confirmed, but executed as a failure: only the fee was charged.
    pub fn failed(&self) -> bool {
        self.proof
            .as_ref()
            .is_some_and(|proof| !proof.record.is_successful())
    }
}

// ---------------------------------------------------------------------------
// Submitter
// ---------------------------------------------------------------------------

/// Sends transactions and optionally waits for their proofs.
#[derive(Clone)]
pub struct Submitter {
    rpc: Arc<dyn RpcClient>,
    poll_interval: Duration,
}

impl Submitter {
    pub fn new(rpc: Arc<dyn RpcClient>, poll_interval: Duration) -> Self {
        Self { rpc, poll_interval }
    }

    /// Sends once and returns after the partition acknowledges.
    pub async fn send(&self, transaction: TransactionOrder) -> Result<TxSubmission, SubmitError> {
        let submission = TxSubmission::new(transaction)?;
        self.send_submission(&submission).await?;
        Ok(submission)
    }

    /// Sends once and waits for the proof.
    pub async fn send_and_confirm(
        &self,
        transaction: TransactionOrder,
        cancel: &Cancellation,
    ) -> Result<TxSubmission, SubmitError> {
        let mut submission = self.send(transaction).await?;
        self.confirm(&mut submission, cancel).await?;
        Ok(submission)
    }

    async fn send_submission(&self, submission: &TxSubmission) -> Result<(), SubmitError> {
        let acked = self.rpc.send_transaction(&submission.transaction).await?;
        if acked != submission.tx_hash {
            debug!(
                local = %hex::encode(submission.tx_hash),
                remote = %hex::encode(acked),
                "partition acknowledged a different hash"
            );
        }
        info!(
            unit_id = %submission.unit_id,
            tx_type = %submission.transaction.attributes(),
            tx_hash = %hex::encode(submission.tx_hash),
            timeout_round = submission.transaction.timeout_round(),
            "transaction submitted"
        );
        Ok(())
    }

    /// Polls until `submission` has a proof, its timeout round passes, or
    /// `cancel` fires.
    pub async fn confirm(
        &self,
        submission: &mut TxSubmission,
        cancel: &Cancellation,
    ) -> Result<(), SubmitError> {
        let mut cancel = cancel.clone();
        let timeout_round = submission.transaction.timeout_round();

        loop {
            let round = self.rpc.get_round_number().await?;
            if let Some(proof) = self.rpc.get_transaction_proof(&submission.tx_hash).await? {
                info!(
                    unit_id = %submission.unit_id,
                    block_round = proof.block_round,
                    status = ?proof.record.server_metadata.status,
                    "transaction confirmed"
                );
                submission.proof = Some(proof);
                return Ok(());
            }
            if round >= timeout_round {
                warn!(
                    unit_id = %submission.unit_id,
                    round,
                    timeout_round,
                    "transaction timed out"
                );
                return Err(SubmitError::TransactionTimedOut {
                    tx_hash: submission.tx_hash,
                    timeout_round,
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => {
                    warn!(unit_id = %submission.unit_id, "confirmation wait cancelled");
                    return Err(SubmitError::Cancelled);
                }
            }
        }
    }
}

impl fmt::Debug for Submitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submitter")
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SubmissionBatch
// ---------------------------------------------------------------------------

/// Several transactions sent together and confirmed together.
///
/// Used where a later step depends on all of them (every burn of a join).
/// The wait is bounded by the largest timeout round in the batch.
#[derive(Debug, Default)]
pub struct SubmissionBatch {
    submissions: Vec<TxSubmission>,
}

impl SubmissionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, transaction: TransactionOrder) -> Result<(), EncodingError> {
        self.submissions.push(TxSubmission::new(transaction)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }

    pub fn submissions(&self) -> &[TxSubmission] {
        &self.submissions
    }

    pub fn into_submissions(self) -> Vec<TxSubmission> {
        self.submissions
    }

    /// Sends every transaction, in order. Stops at the first failure.
    pub async fn send_all(&self, submitter: &Submitter) -> Result<(), SubmitError> {
        for submission in &self.submissions {
            submitter.send_submission(submission).await?;
        }
        Ok(())
    }

    /// Waits until every transaction has a proof.
    pub async fn confirm_all(
        &mut self,
        submitter: &Submitter,
        cancel: &Cancellation,
    ) -> Result<(), SubmitError> {
        let mut cancel = cancel.clone();
        let Some(last) = self
            .submissions
            .iter()
            .max_by_key(|s| s.transaction.timeout_round())
        else {
            return Ok(());
        };
        let (max_timeout, last_hash) = (last.transaction.timeout_round(), last.tx_hash);

        loop {
            let round = submitter.rpc.get_round_number().await?;
            for submission in self.submissions.iter_mut().filter(|s| !s.confirmed()) {
                submission.proof = submitter
                    .rpc
                    .get_transaction_proof(&submission.tx_hash)
                    .await?;
            }

            let pending = self.submissions.iter().filter(|s| !s.confirmed()).count();
            if pending == 0 {
                info!(count = self.submissions.len(), "batch confirmed");
                return Ok(());
            }
            if round >= max_timeout {
                warn!(pending, round, timeout_round = max_timeout, "batch timed out");
                let tx_hash = self
                    .submissions
                    .iter()
                    .find(|s| !s.confirmed())
                    .map_or(last_hash, |s| s.tx_hash);
                return Err(SubmitError::TransactionTimedOut {
                    tx_hash,
                    timeout_round: max_timeout,
                });
            }
            debug!(pending, round, "waiting for batch confirmation");

            tokio::select! {
                _ = tokio::time::sleep(submitter.poll_interval) => {}
                _ = cancel.cancelled() => {
                    warn!(pending, "batch confirmation wait cancelled");
                    return Err(SubmitError::Cancelled);
                }
            }
        }
    }
}
