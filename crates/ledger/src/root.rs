//! Immutable chain root.

use meridian_types::{GenesisDoc, Hash};

/// The genesis document a chain was created from and its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    genesis_hash: Hash,
    genesis_doc: GenesisDoc,
}

impl Root {
    /// Create a root from a genesis document.
    pub fn new(genesis_doc: &GenesisDoc) -> Self {
        Self {
            genesis_hash: genesis_doc.hash(),
            genesis_doc: genesis_doc.clone(),
        }
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis_hash
    }

    pub fn genesis_doc(&self) -> &GenesisDoc {
        &self.genesis_doc
    }
}
