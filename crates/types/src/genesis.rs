//! Genesis document.

use crate::{Hash, PublicKey};
use sbor::prelude::*;
use std::fmt;

/// A validator listed in the genesis document.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct GenesisValidator {
    /// Human readable name.
    pub name: String,

    /// Validator public key.
    pub public_key: PublicKey,

    /// Initial voting power.
    pub power: u64,
}

/// The document a chain is created from.
///
/// Its hash anchors the chain: a ledger persisted under one genesis document
/// must never be reopened with another.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct GenesisDoc {
    /// Chain identifier.
    pub chain_id: String,

    /// Genesis time (milliseconds since the Unix epoch).
    pub genesis_time: u64,

    /// Initial validators, in document order.
    pub validators: Vec<GenesisValidator>,
}

impl GenesisDoc {
    /// Create a new genesis document.
    pub fn new(
        chain_id: impl Into<String>,
        genesis_time: u64,
        validators: Vec<GenesisValidator>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            genesis_time,
            validators,
        }
    }

    /// Content hash of the document.
    pub fn hash(&self) -> Hash {
        let bytes = basic_encode(self).expect("GenesisDoc serialization should never fail");
        Hash::from_bytes(&bytes)
    }

    /// Sum of all initial validator power, or None on overflow.
    pub fn total_power(&self) -> Option<u64> {
        self.validators
            .iter()
            .try_fold(0u64, |total, v| total.checked_add(v.power))
    }
}

impl fmt::Display for GenesisDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GenesisDoc{{ChainID: {}; GenesisTime: {}; Validators: [",
            self.chain_id, self.genesis_time
        )?;
        for (i, v) in self.validators.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}({})->{}", v.name, v.public_key.address(), v.power)?;
        }
        write!(f, "]}}")
    }
}
