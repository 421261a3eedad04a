//! Ledger errors.

use crate::StoreError;
use meridian_types::Hash;
use meridian_validators::ValidatorsError;
use thiserror::Error;

/// Errors from loading, committing or persisting the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The stored ledger was created from a different genesis document.
    #[error(
        "genesis document has hash {supplied}, which does not match the one found in the store: {stored}"
    )]
    GenesisMismatch {
        /// Hash of the genesis document found in the store.
        stored: Hash,
        /// Hash of the genesis document supplied at startup.
        supplied: Hash,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode ledger state: {0}")]
    Encode(String),

    #[error("failed to decode ledger state: {0}")]
    Decode(String),

    #[error(transparent)]
    Validators(#[from] ValidatorsError),

    /// A block moved at least a third of the voting power.
    #[error(
        "total flow {total_flow} in committed block exceeds max flow {max_flow}, refusing unsafe validator transition"
    )]
    UnsafeValidatorTransition {
        /// Flow accumulated in the block.
        total_flow: u64,
        /// Bound the flow was checked against.
        max_flow: u64,
    },

    /// The ledger stopped after an unsafe validator transition.
    #[error("ledger halted after an unsafe validator transition")]
    Halted,
}

impl LedgerError {
    /// Whether the host must stop instead of carrying on.
    pub fn is_fatal(&self) -> bool {
        match self {
            LedgerError::GenesisMismatch { .. }
            | LedgerError::Decode(_)
            | LedgerError::UnsafeValidatorTransition { .. }
            | LedgerError::Halted => true,
            LedgerError::Validators(ValidatorsError::Decode(_)) => true,
            LedgerError::Store(_) | LedgerError::Encode(_) | LedgerError::Validators(_) => false,
        }
    }
}
