//! Address-keyed multiset of validator power.

use crate::ValidatorsError;
use meridian_types::{Address, PublicKey};
use std::collections::BTreeMap;
use std::fmt;

/// A validator's entry in a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    public_key: PublicKey,
    power: u64,
}

/// A multiset of validator power keyed by address.
///
/// Used both for the global state of validators and as a per-block
/// accumulator of changes. Iteration is always in ascending address order.
///
/// Every mutation is checked: an operation that would overflow or underflow
/// fails without changing the set. Entries whose power drops to zero are kept
/// so the public key remains available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    entries: BTreeMap<Address, Entry>,
    total_power: u64,
}

impl Validators {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `(public_key, power)` pairs.
    ///
    /// Later pairs for the same address replace earlier ones.
    pub fn from_powers<'a, I>(powers: I) -> Result<Self, ValidatorsError>
    where
        I: IntoIterator<Item = (&'a PublicKey, u64)>,
    {
        let mut validators = Self::new();
        for (public_key, power) in powers {
            validators.alter_power(public_key, power)?;
        }
        Ok(validators)
    }

    /// Set a validator's power to an absolute value.
    pub fn alter_power(
        &mut self,
        public_key: &PublicKey,
        power: u64,
    ) -> Result<(), ValidatorsError> {
        let address = public_key.address();
        // total_power >= any single entry, so only the addition can fail
        let total_power = (self.total_power - self.power(&address))
            .checked_add(power)
            .ok_or(ValidatorsError::Overflow { address, power })?;

        self.entries.insert(
            address,
            Entry {
                public_key: *public_key,
                power,
            },
        );
        self.total_power = total_power;
        Ok(())
    }

    /// Add `power` to a validator's current power.
    pub fn add_power(
        &mut self,
        public_key: &PublicKey,
        power: u64,
    ) -> Result<(), ValidatorsError> {
        let address = public_key.address();
        let new_power = self
            .power(&address)
            .checked_add(power)
            .ok_or(ValidatorsError::Overflow { address, power })?;
        self.alter_power(public_key, new_power)
    }

    /// Subtract `power` from a validator's current power.
    ///
    /// Fails if the validator holds less than `power`.
    pub fn subtract_power(
        &mut self,
        public_key: &PublicKey,
        power: u64,
    ) -> Result<(), ValidatorsError> {
        let address = public_key.address();
        let current = self.power(&address);
        let new_power = current.checked_sub(power).ok_or(ValidatorsError::Underflow {
            address,
            power,
            current,
        })?;
        self.alter_power(public_key, new_power)
    }

    /// Add every validator of `other` into this set.
    ///
    /// Either all of `other` is added or, on error, nothing is.
    pub fn add(&mut self, other: &Validators) -> Result<(), ValidatorsError> {
        let mut sum = self.clone();
        for (public_key, power) in other.iter() {
            sum.add_power(public_key, power)?;
        }
        *self = sum;
        Ok(())
    }

    /// Subtract every validator of `other` from this set.
    ///
    /// Either all of `other` is subtracted or, on error, nothing is.
    pub fn subtract(&mut self, other: &Validators) -> Result<(), ValidatorsError> {
        let mut difference = self.clone();
        for (public_key, power) in other.iter() {
            difference.subtract_power(public_key, power)?;
        }
        *self = difference;
        Ok(())
    }

    /// Power of a validator (zero if absent).
    pub fn power(&self, address: &Address) -> u64 {
        self.entries.get(address).map(|e| e.power).unwrap_or(0)
    }

    /// Public key recorded for an address.
    pub fn public_key(&self, address: &Address) -> Option<&PublicKey> {
        self.entries.get(address).map(|e| &e.public_key)
    }

    /// Iterate `(public_key, power)` pairs in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (&PublicKey, u64)> + '_ {
        self.entries.values().map(|e| (&e.public_key, e.power))
    }

    /// Visit validators in ascending address order until `f` returns true.
    ///
    /// Returns true if iteration was stopped early.
    pub fn iterate<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&PublicKey, u64) -> bool,
    {
        self.iter().any(|(public_key, power)| f(public_key, power))
    }

    /// Number of entries, including zero-power ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of validators with non-zero power.
    pub fn count_non_zero(&self) -> usize {
        self.entries.values().filter(|e| e.power > 0).count()
    }

    /// Sum of all validator power.
    pub fn total_power(&self) -> u64 {
        self.total_power
    }

    /// Copy of the set without its zero-power entries.
    pub fn trimmed(&self) -> Validators {
        Validators {
            entries: self
                .entries
                .iter()
                .filter(|(_, entry)| entry.power > 0)
                .map(|(address, entry)| (*address, *entry))
                .collect(),
            total_power: self.total_power,
        }
    }
}

impl fmt::Display for Validators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Validators{{TotalPower: {}; Count: {}; ",
            self.total_power,
            self.len()
        )?;
        for (i, (address, entry)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}->{}", address, entry.power)?;
        }
        write!(f, "}}")
    }
}
