//! # Wallet Configuration & Constants
//!
//! Size limits the partition enforces on token metadata, the defaults the
//! wallet runs with, and [`WalletConfig`], the one struct a caller fills in
//! (or loads from JSON) to point the wallet at a partition.
//!
//! Limits are checked client side before anything is signed. The partition
//! checks them again; we just prefer a typed error to a burned fee.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Token Type Limits
// ---------------------------------------------------------------------------

/// Maximum length of a token type symbol, in bytes.
pub const MAX_SYMBOL_LENGTH: usize = 16;

/// Maximum length of a token type name, in bytes.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum length of an icon MIME type, in bytes.
pub const MAX_ICON_TYPE_LENGTH: usize = 64;

/// Maximum size of icon data. 64 KiB.
pub const MAX_ICON_DATA_LENGTH: usize = 64 * 1024;

/// Maximum number of decimal places of a fungible token type.
pub const MAX_DECIMAL_PLACES: u32 = 8;

// ---------------------------------------------------------------------------
// NFT Limits
// ---------------------------------------------------------------------------

/// Maximum length of an NFT name, in bytes.
pub const MAX_NFT_NAME_LENGTH: usize = 256;

/// Maximum length of an NFT URI, in bytes.
pub const MAX_URI_LENGTH: usize = 4 * 1024;

/// Maximum size of NFT data. 64 KiB.
pub const MAX_NFT_DATA_LENGTH: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Partition identifier of the tokens partition.
pub const DEFAULT_PARTITION_ID: u32 = 2;

/// Maximum fee a single transaction may be charged, in fee credit units.
pub const DEFAULT_MAX_FEE: u64 = 10;

/// How many rounds past the current one a transaction stays valid.
pub const DEFAULT_TX_TIMEOUT_ROUNDS: u64 = 10;

/// How often the submitter polls for a proof while waiting for confirmation.
pub const DEFAULT_CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on the units folded into one join by dust collection.
pub const DEFAULT_DUST_MAX_UNITS: usize = 100;

// ---------------------------------------------------------------------------
// WalletConfig
// ---------------------------------------------------------------------------

/// Errors loading or validating a [`WalletConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime configuration of a wallet instance.
///
/// Every field has a default, so a JSON file only needs to carry the values
/// it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Partition the wallet's transactions target.
    pub partition_id: u32,
    /// `max_fee` written into every transaction's client metadata.
    pub max_fee: u64,
    /// Timeout distance: `timeout_round = current_round + tx_timeout_rounds`.
    pub tx_timeout_rounds: u64,
    /// Proof polling interval while waiting for confirmation, in ms.
    pub confirmation_poll_interval_ms: u64,
    /// Maximum number of units burned into a single join.
    pub dust_max_units: usize,
    /// Wait for a proof after every single-transaction operation. Multi-step
    /// operations (accumulating transfers, dust collection) always wait for
    /// their intermediate steps.
    pub confirm_transactions: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            partition_id: DEFAULT_PARTITION_ID,
            max_fee: DEFAULT_MAX_FEE,
            tx_timeout_rounds: DEFAULT_TX_TIMEOUT_ROUNDS,
            confirmation_poll_interval_ms: DEFAULT_CONFIRMATION_POLL_INTERVAL.as_millis() as u64,
            dust_max_units: DEFAULT_DUST_MAX_UNITS,
            confirm_transactions: true,
        }
    }
}

impl WalletConfig {
    /// Load a config from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the wallet cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tx_timeout_rounds == 0 {
            return Err(ConfigError::Invalid(
                "tx_timeout_rounds must be at least 1".into(),
            ));
        }
        if self.confirmation_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "confirmation_poll_interval_ms must be positive".into(),
            ));
        }
        if self.dust_max_units < 2 {
            return Err(ConfigError::Invalid(
                "dust_max_units must be at least 2".into(),
            ));
        }
        Ok(())
    }

    /// The poll interval as a [`Duration`].
    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_interval_ms)
    }
}
