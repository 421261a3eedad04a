//! Validator power bookkeeping for the Meridian ledger.
//!
//! - [`Validators`]: address-keyed multiset of validator power with checked
//!   arithmetic and a canonical binary encoding
//! - [`ValidatorsRing`]: sliding window over recent blocks that bounds how
//!   much power may move between consecutive committed sets
//! - [`ValidatorWriter`]: the write handle the execution layer uses to
//!   propose power changes

mod codec;
mod error;
mod ring;
mod validators;
mod writer;

pub use codec::decode_validators;
pub use error::{DecodeError, DecodeErrorKind, ValidatorsError};
pub use ring::{PersistedRing, RotationSummary, ValidatorsRing, MIN_WINDOW_SIZE};
pub use validators::Validators;
pub use writer::ValidatorWriter;
