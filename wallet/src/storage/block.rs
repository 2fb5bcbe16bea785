//! Confirmed partition blocks, as delivered to the block processor.

use serde::{Deserialize, Serialize};

use crate::transaction::TransactionRecord;

/// A finalized block of the tokens partition.
///
/// The wallet never produces or validates blocks. It receives them from a
/// synchronization feed in round order (with gaps, since empty rounds are
/// not delivered) and replays their records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Round the block was produced in.
    pub round: u64,
    /// Executed transactions, in execution order.
    pub transactions: Vec<TransactionRecord>,
}

impl Block {
    pub fn new(round: u64, transactions: Vec<TransactionRecord>) -> Self {
        Self {
            round,
            transactions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
