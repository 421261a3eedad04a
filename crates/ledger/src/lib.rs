//! Validator-set ledger for the Meridian chain.
//!
//! [`Blockchain`] owns the chain root, the tip and two validator rotation
//! windows behind a single reader/writer lock. It checkpoints its state into a
//! [`Store`] before every commit so a restarted node resumes from a block
//! consensus has already finalised.
//!
//! # Example
//!
//! ```no_run
//! use meridian_ledger::{Blockchain, LedgerConfig, MemoryStore};
//! use meridian_types::{GenesisDoc, Hash};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn run(genesis: GenesisDoc) -> Result<(), meridian_ledger::LedgerError> {
//! let store = Arc::new(MemoryStore::new());
//! let ledger = Blockchain::load_or_new(store, &genesis, LedgerConfig::default())?;
//! let summary = ledger.commit_block(Duration::from_secs(1), Hash::ZERO, Hash::ZERO)?;
//! assert_eq!(summary.total_flow, 0);
//! # Ok(())
//! # }
//! ```

mod blockchain;
mod config;
mod error;
mod root;
mod store;
mod tip;

pub use blockchain::{Blockchain, PersistedState, ValidatorHandle};
pub use config::{LedgerConfig, DEFAULT_CHECK_WINDOW_SIZE, DEFAULT_STATE_KEY, DEFAULT_WINDOW_SIZE};
pub use error::LedgerError;
pub use root::Root;
pub use store::{MemoryStore, Store, StoreError};
pub use tip::{Tip, ValidatorsHistory};
