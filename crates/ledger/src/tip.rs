//! Chain tip: the latest committed block and the validator window.

use crate::Root;
use meridian_types::{BlockHeight, Hash};
use meridian_validators::{Validators, ValidatorsRing};
use std::time::Duration;

/// Snapshot of the validator window at the tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorsHistory {
    /// Committed set with zero-power entries removed.
    pub current: Validators,
    /// Copies of every bucket, ordered head, previous, ..., tail.
    pub buckets: Vec<Validators>,
    /// Height the snapshot was taken at.
    pub height: BlockHeight,
}

/// The mutable end of the chain.
///
/// Times are durations since the Unix epoch.
#[derive(Debug, Clone)]
pub struct Tip {
    chain_id: String,
    last_block_height: BlockHeight,
    last_block_time: Duration,
    last_block_hash: Hash,
    last_commit_time: Duration,
    app_hash_after_last_block: Hash,
    window: ValidatorsRing,
}

impl Tip {
    /// Tip of a chain that has not committed any block.
    ///
    /// The block time starts at genesis time and the app hash at the genesis
    /// hash.
    pub fn new(root: &Root, window: ValidatorsRing) -> Self {
        let genesis_time = Duration::from_millis(root.genesis_doc().genesis_time);
        Self {
            chain_id: root.genesis_doc().chain_id.clone(),
            last_block_height: BlockHeight::GENESIS,
            last_block_time: genesis_time,
            last_block_hash: Hash::ZERO,
            last_commit_time: genesis_time,
            app_hash_after_last_block: root.genesis_hash(),
            window,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn last_block_height(&self) -> BlockHeight {
        self.last_block_height
    }

    pub fn last_block_time(&self) -> Duration {
        self.last_block_time
    }

    pub fn last_block_hash(&self) -> Hash {
        self.last_block_hash
    }

    /// Wall clock time the last block was committed at.
    pub fn last_commit_time(&self) -> Duration {
        self.last_commit_time
    }

    pub fn app_hash_after_last_block(&self) -> Hash {
        self.app_hash_after_last_block
    }

    /// Copy of the last committed validator set.
    pub fn validators(&self) -> Validators {
        self.window.prev().clone()
    }

    /// Copy of the set being accumulated for the next block.
    pub fn pending_validators(&self) -> Validators {
        self.window.head().clone()
    }

    /// Number of committed validators with non-zero power.
    pub fn num_validators(&self) -> usize {
        self.window.prev().count_non_zero()
    }

    pub fn validators_history(&self) -> ValidatorsHistory {
        ValidatorsHistory {
            current: self.window.prev().trimmed(),
            buckets: self
                .window
                .ordered_buckets()
                .into_iter()
                .cloned()
                .collect(),
            height: self.last_block_height,
        }
    }

    pub fn window(&self) -> &ValidatorsRing {
        &self.window
    }

    pub(crate) fn window_mut(&mut self) -> &mut ValidatorsRing {
        &mut self.window
    }

    /// Record a committed block on top of an already rotated window.
    pub(crate) fn advance(
        &mut self,
        window: ValidatorsRing,
        block_time: Duration,
        block_hash: Hash,
        app_hash: Hash,
        commit_time: Duration,
    ) {
        self.window = window;
        self.last_block_height = self.last_block_height.next();
        self.last_block_time = block_time;
        self.last_block_hash = block_hash;
        self.app_hash_after_last_block = app_hash;
        self.last_commit_time = commit_time;
    }

    /// Overwrite the tip with persisted fields.
    pub(crate) fn restore(
        &mut self,
        window: ValidatorsRing,
        last_block_height: BlockHeight,
        last_block_time: Duration,
        last_block_hash: Hash,
        app_hash_after_last_block: Hash,
    ) {
        self.window = window;
        self.last_block_height = last_block_height;
        self.last_block_time = last_block_time;
        self.last_block_hash = last_block_hash;
        self.app_hash_after_last_block = app_hash_after_last_block;
    }
}
