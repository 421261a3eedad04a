//! Ledger configuration.

use meridian_validators::MIN_WINDOW_SIZE;
use serde::Deserialize;

/// Blocks to average validator power over.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Window size of the transaction-check path.
pub const DEFAULT_CHECK_WINDOW_SIZE: usize = 2;

/// Store key the ledger state is checkpointed under.
pub const DEFAULT_STATE_KEY: &str = "BlockchainState";

/// Configuration for the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerConfig {
    /// Buckets in the delivery window.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Buckets in the check window.
    #[serde(default = "default_check_window_size")]
    pub check_window_size: usize,

    /// Store key for the persisted state.
    #[serde(default = "default_state_key")]
    pub state_key: String,
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_check_window_size() -> usize {
    DEFAULT_CHECK_WINDOW_SIZE
}

fn default_state_key() -> String {
    DEFAULT_STATE_KEY.to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            check_window_size: DEFAULT_CHECK_WINDOW_SIZE,
            state_key: DEFAULT_STATE_KEY.to_string(),
        }
    }
}

impl LedgerConfig {
    /// Delivery window size, raised to the minimum.
    pub fn effective_window_size(&self) -> usize {
        self.window_size.max(MIN_WINDOW_SIZE)
    }

    /// Check window size, raised to the minimum.
    pub fn effective_check_window_size(&self) -> usize {
        self.check_window_size.max(MIN_WINDOW_SIZE)
    }
}
