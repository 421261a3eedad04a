//! Sliding window of validator power over recent blocks.
//!
//! # Flow bound
//!
//! Light clients following a sequence of validator sets need at least one
//! correct validator common to every consecutive pair of sets. That holds only
//! if strictly less than one third of the voting power moves between two
//! committed sets. The window measures every proposed change against the last
//! committed set (`prev`) and rejects changes whose accumulated flow would
//! exceed `max_flow`.
//!
//! The flow accumulator *sets* each validator's flow rather than adding to it:
//! flow is always measured from `prev`, so changing one validator several
//! times in a block only counts the magnitude of its final change. A validator
//! can therefore be toggled between acceptable values any number of times in a
//! block while the bound sees a single flow.

use crate::{DecodeError, DecodeErrorKind, Validators, ValidatorsError};
use meridian_types::{Address, PublicKey};
use sbor::prelude::*;
use std::fmt;
use tracing::{debug, trace};

/// Smallest number of buckets a window can have.
pub const MIN_WINDOW_SIZE: usize = 2;

/// Outcome of advancing the window by one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSummary {
    /// Total power of the sealed bucket minus that of the previous one.
    pub total_power_change: i128,
    /// Flow accumulated during the sealed block.
    pub total_flow: u64,
}

/// A fixed-size ring of validator sets.
///
/// - `prev()` is the last committed set.
/// - `head()` is the set being built for the next commit.
/// - `next()` is the bucket evicted by the next rotation.
///
/// `power` is always the per-validator sum over every bucket, and `flow`
/// holds this block's flow per validator. No bucket holds more than
/// [`capacity`](Self::capacity), so rotating can never overflow `power`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorsRing {
    buckets: Vec<Validators>,
    power: Validators,
    flow: Validators,
    head: usize,
}

impl ValidatorsRing {
    /// Create a window of `size` buckets (at least 2) seeded with `initial`.
    ///
    /// The initial set is written into both the previous and the head bucket.
    /// Fails if its total power exceeds the window's capacity.
    pub fn new(initial: &Validators, size: usize) -> Result<Self, ValidatorsError> {
        let size = size.max(MIN_WINDOW_SIZE);
        check_capacity(initial.total_power(), size)?;
        let mut ring = Self {
            buckets: vec![Validators::new(); size],
            power: Validators::new(),
            flow: Validators::new(),
            head: 0,
        };

        let prev = ring.index(-1);
        ring.buckets[prev] = initial.clone();
        ring.buckets[ring.head] = initial.clone();
        ring.power.add(initial)?;
        ring.power.add(initial)?;

        Ok(ring)
    }

    /// Change a validator's power in the head bucket.
    ///
    /// Rejects the change if this block's accumulated flow would exceed
    /// `max_flow()` or the head would exceed `capacity()`. On success returns
    /// the flow induced by this change, measured against the last committed
    /// set.
    pub fn alter_power(
        &mut self,
        public_key: &PublicKey,
        power: u64,
    ) -> Result<u64, ValidatorsError> {
        let address = public_key.address();
        let head = self.head();
        let head_power = (head.total_power() - head.power(&address)).saturating_add(power);
        check_capacity(head_power, self.size())?;

        let flow = self.flow(&address, power);
        let max_flow = self.max_flow();

        self.flow.alter_power(public_key, flow)?;
        if self.flow.total_power() > max_flow {
            self.restore_flow(public_key)?;
            let total_flow = self.flow.total_power();
            let err = ValidatorsError::FlowExceeded {
                address,
                from: self.prev().power(&address),
                to: power,
                flow,
                total_flow,
                max_flow,
                allowable: max_flow.saturating_sub(total_flow),
            };
            debug!(%address, power, flow, total_flow, max_flow, "Rejected validator power change");
            return Err(err);
        }

        if let Err(e) = self.buckets[self.head].alter_power(public_key, power) {
            self.restore_flow(public_key)?;
            return Err(e);
        }

        trace!(%address, power, flow, "Validator power change accepted");
        Ok(flow)
    }

    /// Reset a validator's flow to the value implied by the head bucket.
    fn restore_flow(&mut self, public_key: &PublicKey) -> Result<(), ValidatorsError> {
        let address = public_key.address();
        let flow = self.flow(&address, self.head().power(&address));
        self.flow.alter_power(public_key, flow)
    }

    /// Magnitude of the change from the last committed power to `power`.
    pub fn flow(&self, address: &Address, power: u64) -> u64 {
        power.abs_diff(self.prev().power(address))
    }

    /// Maximum flow permitted in the current block.
    ///
    /// `floor(T / 3) - 1` where `T` is the total power of the last committed
    /// set, keeping the flow strictly below one third. Saturates at zero for
    /// sets with less than three units of power, where only no-op changes
    /// are admitted.
    pub fn max_flow(&self) -> u64 {
        (self.prev().total_power() / 3).saturating_sub(1)
    }

    /// Seal the head bucket and advance the window by one block.
    ///
    /// The oldest bucket is evicted from the cumulative power, a copy of the
    /// head becomes the new head (so the sealed set seeds the next block) and
    /// the flow accumulator is cleared. On error the window is unchanged.
    pub fn rotate(&mut self) -> Result<RotationSummary, ValidatorsError> {
        let total_power_change =
            i128::from(self.head().total_power()) - i128::from(self.prev().total_power());
        let total_flow = self.flow.total_power();

        let mut power = self.power.clone();
        power.subtract(self.next())?;
        let head_copy = self.head().clone();
        power.add(&head_copy)?;

        self.power = power;
        self.head = self.index(1);
        self.buckets[self.head] = head_copy;
        self.flow = Validators::new();

        debug!(
            head = self.head,
            total_power_change, total_flow, "Rotated validator window"
        );
        Ok(RotationSummary {
            total_power_change,
            total_flow,
        })
    }

    /// The last committed set.
    pub fn prev(&self) -> &Validators {
        &self.buckets[self.index(-1)]
    }

    /// The set being accumulated for the next commit.
    pub fn head(&self) -> &Validators {
        &self.buckets[self.head]
    }

    /// The bucket the next rotation evicts.
    pub fn next(&self) -> &Validators {
        &self.buckets[self.index(1)]
    }

    /// Per-validator power summed over every bucket.
    pub fn cumulative_power(&self) -> &Validators {
        &self.power
    }

    /// Flow accumulated in the current block.
    pub fn current_flow(&self) -> &Validators {
        &self.flow
    }

    /// Largest total power a single bucket may hold.
    pub fn capacity(&self) -> u64 {
        capacity(self.size())
    }

    /// Number of buckets.
    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    /// Index of the head bucket.
    pub fn head_index(&self) -> usize {
        self.head
    }

    /// Buckets ordered head, previous, ..., tail.
    pub fn ordered_buckets(&self) -> Vec<&Validators> {
        (0..self.size())
            .map(|i| &self.buckets[self.index(-(i as isize))])
            .collect()
    }

    fn index(&self, offset: isize) -> usize {
        (self.head as isize + offset).rem_euclid(self.buckets.len() as isize) as usize
    }

    /// Snapshot the window for persistence.
    pub fn persistable(&self) -> PersistedRing {
        PersistedRing {
            buckets: self.buckets.iter().map(Validators::encode).collect(),
            power: self.power.encode(),
            flow: self.flow.encode(),
            head: self.head as u64,
        }
    }

    /// Restore a window from its persisted form.
    pub fn from_persisted(persisted: &PersistedRing) -> Result<Self, ValidatorsError> {
        let size = persisted.buckets.len();
        if size < MIN_WINDOW_SIZE {
            return Err(DecodeError::new(0, DecodeErrorKind::RingTooSmall(size)).into());
        }
        if persisted.head >= size as u64 {
            return Err(DecodeError::new(
                0,
                DecodeErrorKind::HeadOutOfRange {
                    head: persisted.head,
                    size,
                },
            )
            .into());
        }

        let buckets = persisted
            .buckets
            .iter()
            .map(|bytes| Validators::decode(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        for bucket in &buckets {
            check_capacity(bucket.total_power(), size)?;
        }
        let power = Validators::decode(&persisted.power)?;
        let flow = Validators::decode(&persisted.flow)?;

        let mut sum = Validators::new();
        for bucket in &buckets {
            sum.add(bucket)?;
        }
        let consistent = sum
            .iter()
            .all(|(key, p)| power.power(&key.address()) == p)
            && sum.total_power() == power.total_power();
        if !consistent {
            return Err(DecodeError::new(0, DecodeErrorKind::InconsistentPower).into());
        }

        Ok(Self {
            buckets,
            power,
            flow,
            head: persisted.head as usize,
        })
    }
}

fn capacity(size: usize) -> u64 {
    u64::MAX / size as u64
}

fn check_capacity(total_power: u64, size: usize) -> Result<(), ValidatorsError> {
    let capacity = capacity(size);
    if total_power > capacity {
        return Err(ValidatorsError::CapacityExceeded {
            total_power,
            capacity,
        });
    }
    Ok(())
}

impl fmt::Display for ValidatorsRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorsRing{{Total: {}; Buckets: Head->", self.power)?;
        for (i, bucket) in self.ordered_buckets().into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", bucket)?;
        }
        write!(f, "<-Tail}}")
    }
}

/// Persisted form of a window: every set in its wire encoding.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct PersistedRing {
    /// Buckets in storage order.
    pub buckets: Vec<Vec<u8>>,
    /// Cumulative power.
    pub power: Vec<u8>,
    /// Flow accumulator.
    pub flow: Vec<u8>,
    /// Head index.
    pub head: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::test_utils::test_public_key;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use tracing_test::traced_test;

    fn make_validators(powers: &[u64]) -> (Vec<PublicKey>, Validators) {
        let keys: Vec<_> = (0..powers.len() as u8).map(test_public_key).collect();
        let validators =
            Validators::from_powers(keys.iter().zip(powers.iter().copied())).unwrap();
        (keys, validators)
    }

    fn bucket_sum(ring: &ValidatorsRing) -> u64 {
        ring.ordered_buckets().iter().map(|b| b.total_power()).sum()
    }

    #[test]
    fn test_new_ring_seeds_prev_and_head() {
        let (_, vs) = make_validators(&[100, 100, 100, 100]);
        let ring = ValidatorsRing::new(&vs, 10).unwrap();

        assert_eq!(ring.size(), 10);
        assert_eq!(ring.prev(), &vs);
        assert_eq!(ring.head(), &vs);
        assert!(ring.next().is_empty());
        assert_eq!(ring.cumulative_power().total_power(), 800);
        assert_eq!(ring.max_flow(), 132);
    }

    #[test]
    fn test_size_clamped_to_minimum() {
        let (_, vs) = make_validators(&[1]);
        assert_eq!(ValidatorsRing::new(&vs, 0).unwrap().size(), MIN_WINDOW_SIZE);
        assert_eq!(ValidatorsRing::new(&vs, 1).unwrap().size(), MIN_WINDOW_SIZE);
    }

    #[traced_test]
    #[test]
    fn test_flow_bound_second_removal_rejected() {
        let (keys, vs) = make_validators(&[100, 100, 100, 100]);
        let mut ring = ValidatorsRing::new(&vs, 10).unwrap();

        assert_eq!(ring.alter_power(&keys[0], 0), Ok(100));

        let err = ring.alter_power(&keys[1], 0).unwrap_err();
        assert_eq!(
            err,
            ValidatorsError::FlowExceeded {
                address: keys[1].address(),
                from: 100,
                to: 0,
                flow: 100,
                total_flow: 100,
                max_flow: 132,
                allowable: 32,
            }
        );

        // The rejected change left head and flow as they were
        assert_eq!(ring.head().power(&keys[1].address()), 100);
        assert_eq!(ring.current_flow().total_power(), 100);
        assert_eq!(ring.head().total_power(), 300);
    }

    #[test]
    fn test_single_change_at_third_rejected() {
        let (keys, vs) = make_validators(&[100, 100, 100, 100]);
        let mut ring = ValidatorsRing::new(&vs, 10).unwrap();

        // floor(400 / 3) = 133 is already too much
        assert!(ring.alter_power(&keys[0], 233).is_err());
        assert_eq!(ring.alter_power(&keys[0], 232), Ok(132));
    }

    #[test]
    fn test_accumulated_flow_rejects_last_call() {
        let (keys, vs) = make_validators(&[100, 100, 100, 100]);
        let mut ring = ValidatorsRing::new(&vs, 10).unwrap();

        assert_eq!(ring.alter_power(&keys[0], 150), Ok(50));
        assert_eq!(ring.alter_power(&keys[1], 150), Ok(50));
        assert_eq!(ring.alter_power(&keys[2], 132), Ok(32));
        assert!(ring.alter_power(&keys[3], 99).is_err());
        assert_eq!(ring.current_flow().total_power(), 132);
    }

    #[test]
    fn test_repeated_changes_counted_once_per_validator() {
        let (keys, vs) = make_validators(&[100, 100, 100, 100]);
        let mut ring = ValidatorsRing::new(&vs, 10).unwrap();

        // Each toggle is measured from the committed set, so the accumulated
        // flow never exceeds the magnitude of the latest change
        for _ in 0..10 {
            assert_eq!(ring.alter_power(&keys[0], 200), Ok(100));
            assert_eq!(ring.alter_power(&keys[0], 100), Ok(0));
        }
        assert_eq!(ring.current_flow().total_power(), 0);
        assert_eq!(ring.alter_power(&keys[0], 0), Ok(100));
        assert_eq!(ring.current_flow().total_power(), 100);
    }

    #[test]
    fn test_new_validator_flow_is_its_power() {
        let (_, vs) = make_validators(&[100, 100, 100, 100]);
        let mut ring = ValidatorsRing::new(&vs, 10).unwrap();
        let newcomer = test_public_key(200);

        assert_eq!(ring.alter_power(&newcomer, 40), Ok(40));
        assert_eq!(ring.head().total_power(), 440);
        assert_eq!(ring.prev().total_power(), 400);
    }

    #[test]
    fn test_small_sets_only_admit_noops() {
        let (keys, vs) = make_validators(&[1, 1]);
        let mut ring = ValidatorsRing::new(&vs, 4).unwrap();

        assert_eq!(ring.max_flow(), 0);
        assert_eq!(ring.alter_power(&keys[0], 1), Ok(0));
        assert!(ring.alter_power(&keys[0], 2).is_err());
    }

    #[test]
    fn test_rotate_without_changes() {
        let (_, vs) = make_validators(&[100, 100, 100, 100]);
        let mut ring = ValidatorsRing::new(&vs, 10).unwrap();

        for _ in 0..3 {
            let summary = ring.rotate().unwrap();
            assert_eq!(summary.total_power_change, 0);
            assert_eq!(summary.total_flow, 0);
            assert_eq!(ring.prev(), &vs);
        }
    }

    #[test]
    fn test_rotate_seals_head() {
        let (keys, vs) = make_validators(&[100, 100, 100, 100]);
        let mut ring = ValidatorsRing::new(&vs, 3).unwrap();

        ring.alter_power(&keys[0], 0).unwrap();
        let sealed = ring.head().clone();
        let summary = ring.rotate().unwrap();

        assert_eq!(summary.total_power_change, -100);
        assert_eq!(summary.total_flow, 100);
        assert_eq!(ring.prev(), &sealed);
        assert_eq!(ring.head(), &sealed);
        assert!(ring.current_flow().is_empty());
        assert_eq!(ring.max_flow(), 99);

        // Head and prev are independent after rotation
        ring.alter_power(&keys[1], 110).unwrap();
        assert_eq!(ring.prev().power(&keys[1].address()), 100);
    }

    #[test]
    fn test_rotation_conserves_power() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let (keys, vs) = make_validators(&[1_000, 1_000, 1_000, 1_000, 1_000]);

        for size in [2usize, 3, 10] {
            let mut ring = ValidatorsRing::new(&vs, size).unwrap();
            assert_eq!(ring.cumulative_power().total_power(), bucket_sum(&ring));

            for _ in 0..40 {
                for _ in 0..rng.gen_range(0..4) {
                    let key = &keys[rng.gen_range(0..keys.len())];
                    let current = ring.head().power(&key.address());
                    let target =
                        current + rng.gen_range(0..100) - rng.gen_range(0..100).min(current);
                    // Rejections are expected once the bound is used up
                    let _ = ring.alter_power(key, target);
                }
                ring.rotate().unwrap();
                assert_eq!(ring.cumulative_power().total_power(), bucket_sum(&ring));
                for key in &keys {
                    let per_bucket: u64 = ring
                        .ordered_buckets()
                        .iter()
                        .map(|b| b.power(&key.address()))
                        .sum();
                    assert_eq!(ring.cumulative_power().power(&key.address()), per_bucket);
                }
            }
        }
    }

    #[test]
    fn test_new_rejects_set_over_capacity() {
        let (_, vs) = make_validators(&[u64::MAX / 3 + 1]);
        assert_eq!(
            ValidatorsRing::new(&vs, 3),
            Err(ValidatorsError::CapacityExceeded {
                total_power: u64::MAX / 3 + 1,
                capacity: u64::MAX / 3,
            })
        );

        // The same set fits a smaller window
        assert!(ValidatorsRing::new(&vs, 2).is_ok());
    }

    #[test]
    fn test_full_capacity_ring_keeps_rotating() {
        let capacity = u64::MAX / 3;
        let (keys, vs) = make_validators(&[capacity]);
        let mut ring = ValidatorsRing::new(&vs, 3).unwrap();
        assert_eq!(ring.capacity(), capacity);

        for _ in 0..4 {
            ring.rotate().unwrap();
        }
        assert_eq!(ring.cumulative_power().total_power(), 3 * capacity);

        // Growing the head past capacity is rejected before any flow is taken
        let before = ring.clone();
        assert_eq!(
            ring.alter_power(&keys[0], capacity + 1),
            Err(ValidatorsError::CapacityExceeded {
                total_power: capacity + 1,
                capacity,
            })
        );
        assert!(matches!(
            ring.alter_power(&test_public_key(50), 1),
            Err(ValidatorsError::CapacityExceeded { .. })
        ));
        assert_eq!(ring, before);

        assert_eq!(ring.alter_power(&keys[0], capacity - 10), Ok(10));
        assert_eq!(ring.alter_power(&test_public_key(50), 10), Ok(10));
        for _ in 0..4 {
            ring.rotate().unwrap();
        }
        assert_eq!(ring.cumulative_power().total_power(), bucket_sum(&ring));
    }

    #[test]
    fn test_ordered_buckets_start_at_head() {
        let (keys, vs) = make_validators(&[100, 100, 100]);
        let mut ring = ValidatorsRing::new(&vs, 3).unwrap();
        ring.alter_power(&keys[0], 120).unwrap();

        let ordered = ring.ordered_buckets();
        assert_eq!(ordered.len(), 3);
        assert_eq!(ordered[0], ring.head());
        assert_eq!(ordered[1], ring.prev());
        assert_eq!(ordered[2], ring.next());
    }

    #[test]
    fn test_persisted_ring_restores_exactly() {
        let (keys, vs) = make_validators(&[100, 200, 300]);
        let mut ring = ValidatorsRing::new(&vs, 5).unwrap();
        ring.alter_power(&keys[0], 150).unwrap();
        ring.rotate().unwrap();
        ring.alter_power(&keys[1], 180).unwrap();

        let restored = ValidatorsRing::from_persisted(&ring.persistable()).unwrap();
        assert_eq!(restored, ring);
        assert_eq!(restored.max_flow(), ring.max_flow());
    }

    #[test]
    fn test_persisted_ring_validation() {
        let (_, vs) = make_validators(&[100, 200, 300]);
        let ring = ValidatorsRing::new(&vs, 4).unwrap();

        let mut too_small = ring.persistable();
        too_small.buckets.truncate(1);
        assert!(matches!(
            ValidatorsRing::from_persisted(&too_small),
            Err(ValidatorsError::Decode(DecodeError {
                kind: DecodeErrorKind::RingTooSmall(1),
                ..
            }))
        ));

        let mut bad_head = ring.persistable();
        bad_head.head = 4;
        assert!(matches!(
            ValidatorsRing::from_persisted(&bad_head),
            Err(ValidatorsError::Decode(DecodeError {
                kind: DecodeErrorKind::HeadOutOfRange { head: 4, size: 4 },
                ..
            }))
        ));

        let (_, heavy) = make_validators(&[u64::MAX / 2]);
        let mut over_capacity = ValidatorsRing::new(&heavy, 2).unwrap().persistable();
        over_capacity.buckets.push(Validators::new().encode());
        assert!(matches!(
            ValidatorsRing::from_persisted(&over_capacity),
            Err(ValidatorsError::CapacityExceeded { .. })
        ));

        let mut inconsistent = ring.persistable();
        inconsistent.power = vs.encode();
        assert!(matches!(
            ValidatorsRing::from_persisted(&inconsistent),
            Err(ValidatorsError::Decode(DecodeError {
                kind: DecodeErrorKind::InconsistentPower,
                ..
            }))
        ));
    }
}
