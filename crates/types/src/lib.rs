//! Core types for the Meridian ledger.
//!
//! This crate provides the foundational types used throughout the
//! validator-set bookkeeping:
//!
//! - **Primitives**: Hash, validator keys
//! - **Identifiers**: Address, BlockHeight
//! - **Genesis**: GenesisDoc and its validators
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend on
//! any other workspace crates, making it the foundation layer.

mod crypto;
mod genesis;
mod hash;
mod identifiers;

pub use crypto::{KeyPair, PublicKey};
pub use genesis::{GenesisDoc, GenesisValidator};
pub use hash::{Hash, HexError};
pub use identifiers::{Address, BlockHeight};

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Create a deterministic key pair from a seed byte.
    pub fn test_keypair(seed: u8) -> KeyPair {
        KeyPair::from_seed(&[seed; 32])
    }

    /// Create a deterministic public key from a seed byte.
    pub fn test_public_key(seed: u8) -> PublicKey {
        test_keypair(seed).public_key()
    }
}
