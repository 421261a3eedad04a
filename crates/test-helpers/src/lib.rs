//! Test helpers for Meridian.
//!
//! Deterministic keys and genesis documents so tests across crates build the
//! same validator sets.

use meridian_types::test_utils::test_keypair;
use meridian_types::{GenesisDoc, GenesisValidator, KeyPair, PublicKey};
use meridian_validators::Validators;

/// Chain id used by every fixture.
pub const TEST_CHAIN_ID: &str = "meridian-test";

/// Genesis time used by every fixture (2024-01-01T00:00:00Z in milliseconds).
pub const TEST_GENESIS_TIME: u64 = 1_704_067_200_000;

/// Deterministic key pairs seeded `0..count`.
pub fn make_keys(count: usize) -> Vec<KeyPair> {
    (0..count).map(|i| test_keypair(i as u8)).collect()
}

/// Genesis document with one validator per entry of `powers`.
///
/// Validator `i` uses the key seeded with `i` and is named `validator-i`.
pub fn test_genesis(powers: &[u64]) -> GenesisDoc {
    test_genesis_with_chain_id(TEST_CHAIN_ID, powers)
}

/// Like [`test_genesis`] with a custom chain id.
pub fn test_genesis_with_chain_id(chain_id: &str, powers: &[u64]) -> GenesisDoc {
    let validators = make_keys(powers.len())
        .iter()
        .zip(powers)
        .enumerate()
        .map(|(i, (keypair, power))| GenesisValidator {
            name: format!("validator-{}", i),
            public_key: keypair.public_key(),
            power: *power,
        })
        .collect();
    GenesisDoc::new(chain_id, TEST_GENESIS_TIME, validators)
}

/// Validator set listed in a genesis document.
pub fn test_validators(genesis: &GenesisDoc) -> Validators {
    Validators::from_powers(genesis.validators.iter().map(|v| (&v.public_key, v.power)))
        .expect("fixture genesis power should not overflow")
}

/// Public key of the `i`th genesis validator.
pub fn genesis_key(genesis: &GenesisDoc, i: usize) -> PublicKey {
    genesis.validators[i].public_key
}
