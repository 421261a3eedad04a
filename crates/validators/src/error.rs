//! Error types for validator sets.

use meridian_types::Address;
use thiserror::Error;

/// Errors from validator power arithmetic and the rotation window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidatorsError {
    /// Setting the power would overflow the total power of the set.
    #[error("setting power of validator {address} to {power} would overflow total power")]
    Overflow {
        /// Validator whose power was being changed.
        address: Address,
        /// Attempted absolute power.
        power: u64,
    },

    /// A bucket's total power would not fit the window's cumulative power.
    #[error("total power {total_power} exceeds window bucket capacity {capacity}")]
    CapacityExceeded {
        /// Total power the bucket would hold.
        total_power: u64,
        /// Largest total power a bucket of this window may hold.
        capacity: u64,
    },

    /// Subtracting more power than the validator holds.
    #[error("cannot subtract {power} from validator {address} which only has {current}")]
    Underflow {
        /// Validator whose power was being changed.
        address: Address,
        /// Power that was to be subtracted.
        power: u64,
        /// Power the validator currently holds.
        current: u64,
    },

    /// The change would push this block's flow over one third of total power.
    #[error(
        "cannot change validator power of {address} from {from} to {to} because that would result \
         in a flow greater than or equal to 1/3 of total power for the next commit: flow induced \
         by change: {flow}, current total flow: {total_flow}/{max_flow} (cumulative/max), \
         remaining allowable flow: {allowable}"
    )]
    FlowExceeded {
        /// Validator whose power was being changed.
        address: Address,
        /// Power in the last committed set.
        from: u64,
        /// Requested power.
        to: u64,
        /// Flow the change would have induced.
        flow: u64,
        /// Flow already accumulated this block.
        total_flow: u64,
        /// Maximum flow permitted this block.
        max_flow: u64,
        /// Flow still available this block.
        allowable: u64,
    },

    /// Malformed encoded validator set or window.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Decoding failure with the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at byte offset {offset}")]
pub struct DecodeError {
    /// Offset into the buffer (zero for window-level errors).
    pub offset: usize,
    /// What went wrong.
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub(crate) fn new(offset: usize, kind: DecodeErrorKind) -> Self {
        Self { offset, kind }
    }
}

/// Kinds of decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    /// Fewer bytes left than a public key needs.
    #[error("truncated public key")]
    TruncatedPublicKey,

    /// Missing, truncated or over-long power varint.
    #[error("invalid power varint")]
    InvalidVarint,

    /// Re-applying a decoded entry failed.
    #[error("invalid validator entry: {0}")]
    InvalidEntry(Box<ValidatorsError>),

    /// A persisted window must have at least two buckets.
    #[error("window has {0} buckets, need at least 2")]
    RingTooSmall(usize),

    /// Head index does not point at a bucket.
    #[error("head index {head} out of range for {size} buckets")]
    HeadOutOfRange {
        /// Persisted head index.
        head: u64,
        /// Number of persisted buckets.
        size: usize,
    },

    /// Cumulative power is not the sum of the buckets.
    #[error("cumulative power does not match the sum of the buckets")]
    InconsistentPower,
}
