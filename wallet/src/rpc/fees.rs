//! Fee credit gate.
//!
//! Every transaction is charged to a fee credit record, so every wallet
//! operation first asks a [`FeeManager`] whether the acting account can pay
//! for the transactions it is about to send. Topping records up is the fee
//! credit protocol's business; this module only checks.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::{RpcClient, RpcError};
use crate::crypto::keys::AccountKey;
use crate::unit::{fee_credit_record_id, UnitId};

/// Errors that can occur while checking fee credit.
#[derive(Debug, Error)]
pub enum FeeError {
    #[error("no fee credit record for account {0}")]
    NoFeeCredit(String),

    #[error("insufficient fee credit: balance {balance}, need {required}")]
    InsufficientFeeCredit { balance: u64, required: u64 },

    #[error("fee credit record {0} is locked")]
    FeeCreditLocked(UnitId),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Ensures an account can pay for a number of transactions.
#[async_trait]
pub trait FeeManager: Send + Sync {
    /// Checks that `account` can pay for `tx_count` transactions and
    /// returns the fee credit record they should be charged to.
    async fn ensure_fee_credit(
        &self,
        account: &AccountKey,
        tx_count: u64,
    ) -> Result<UnitId, FeeError>;
}

/// [`FeeManager`] that reads the account's fee credit record from the
/// partition and requires `tx_count * max_fee` of balance.
pub struct RecordFeeManager {
    rpc: Arc<dyn RpcClient>,
    max_fee: u64,
}

impl RecordFeeManager {
    pub fn new(rpc: Arc<dyn RpcClient>, max_fee: u64) -> Self {
        Self { rpc, max_fee }
    }
}

#[async_trait]
impl FeeManager for RecordFeeManager {
    async fn ensure_fee_credit(
        &self,
        account: &AccountKey,
        tx_count: u64,
    ) -> Result<UnitId, FeeError> {
        let public_key = account.public_key();
        let fcr_id = fee_credit_record_id(&public_key);

        let bill = self
            .rpc
            .get_fee_credit_record(&fcr_id)
            .await?
            .ok_or_else(|| FeeError::NoFeeCredit(public_key.to_string()))?;

        if bill.is_locked() {
            return Err(FeeError::FeeCreditLocked(fcr_id));
        }

        let required = tx_count.saturating_mul(self.max_fee);
        if bill.balance < required {
            return Err(FeeError::InsufficientFeeCredit {
                balance: bill.balance,
                required,
            });
        }

        debug!(fcr = %fcr_id, balance = bill.balance, required, "fee credit sufficient");
        Ok(fcr_id)
    }
}
