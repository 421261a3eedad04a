//! Write handle for proposing validator power changes.

use crate::{Validators, ValidatorsError, ValidatorsRing};
use meridian_types::PublicKey;

/// Something validator power changes can be applied to.
///
/// Returns the flow induced by the change. Plain sets have no committed
/// baseline and report zero flow.
pub trait ValidatorWriter {
    /// Error returned when a change is rejected.
    type Error;

    /// Set a validator's power to an absolute value.
    fn alter_power(&mut self, public_key: &PublicKey, power: u64) -> Result<u64, Self::Error>;
}

impl ValidatorWriter for ValidatorsRing {
    type Error = ValidatorsError;

    fn alter_power(
        &mut self,
        public_key: &PublicKey,
        power: u64,
    ) -> Result<u64, ValidatorsError> {
        ValidatorsRing::alter_power(self, public_key, power)
    }
}

impl ValidatorWriter for Validators {
    type Error = ValidatorsError;

    fn alter_power(
        &mut self,
        public_key: &PublicKey,
        power: u64,
    ) -> Result<u64, ValidatorsError> {
        Validators::alter_power(self, public_key, power).map(|()| 0)
    }
}
