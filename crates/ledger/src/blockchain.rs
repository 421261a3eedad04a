//! The ledger: chain root, tip and the validator windows behind one lock.
//!
//! # Commit Protocol
//!
//! `commit_block` runs under the exclusive lock:
//!
//! 1. Checkpoint the current (pre-rotation) state to the store. A crash after
//!    this point resumes from the previous block, which consensus has already
//!    finalised.
//! 2. Take `max_flow` from the committed set.
//! 3. Rotate the delivery and check windows.
//! 4. Halt if the sealed block's flow exceeds `max_flow`.
//! 5. Advance the tip.
//!
//! A failed checkpoint leaves the ledger exactly as it was.

use crate::{LedgerConfig, LedgerError, Root, Store, Tip, ValidatorsHistory};
use meridian_types::{BlockHeight, GenesisDoc, Hash, PublicKey};
use meridian_validators::{
    PersistedRing, RotationSummary, ValidatorWriter, Validators, ValidatorsRing,
};
use parking_lot::RwLock;
use sbor::prelude::*;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, trace};

/// Record checkpointed into the store.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct PersistedState {
    pub genesis_doc: GenesisDoc,
    pub app_hash_after_last_block: Hash,
    pub last_block_height: BlockHeight,
    pub last_block_hash: Hash,
    /// Milliseconds since the Unix epoch.
    pub last_block_time: u64,
    pub validator_window: PersistedRing,
}

impl PersistedState {
    /// Encode with SBOR.
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        basic_encode(self).map_err(|e| LedgerError::Encode(format!("{:?}", e)))
    }

    /// Decode from SBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        basic_decode(bytes).map_err(|e| LedgerError::Decode(format!("{:?}", e)))
    }
}

/// Everything that changes on commit.
struct LedgerState {
    tip: Tip,
    /// Window used by the transaction-check path, rotated in lockstep.
    check_window: ValidatorsRing,
    halted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowKind {
    Delivery,
    Check,
}

/// Validator-set ledger.
///
/// Share it behind an `Arc`: every method takes `&self` and synchronises
/// through the internal lock.
pub struct Blockchain {
    store: Arc<dyn Store>,
    config: LedgerConfig,
    root: Root,
    state: RwLock<LedgerState>,
}

impl Blockchain {
    /// Load the ledger from `store`, or create it from `genesis_doc` if the
    /// store holds no state.
    ///
    /// Fails with [`LedgerError::GenesisMismatch`] if the stored ledger was
    /// created from a different genesis document. Nothing is written.
    pub fn load_or_new(
        store: Arc<dyn Store>,
        genesis_doc: &GenesisDoc,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        info!(
            state_key = %config.state_key,
            "Trying to load ledger state from store"
        );

        match store.get(config.state_key.as_bytes())? {
            Some(bytes) if !bytes.is_empty() => {
                let persisted = PersistedState::decode(&bytes)?;
                let stored = persisted.genesis_doc.hash();
                let supplied = genesis_doc.hash();
                if stored != supplied {
                    error!(
                        %stored,
                        %supplied,
                        stored_genesis = %persisted.genesis_doc,
                        supplied_genesis = %genesis_doc,
                        "Genesis document does not match the stored ledger"
                    );
                    return Err(LedgerError::GenesisMismatch { stored, supplied });
                }

                let ledger = Self::from_persisted(store, persisted, config)?;
                info!(
                    chain_id = %ledger.chain_id(),
                    height = ledger.last_block_height().0,
                    "Loaded ledger state"
                );
                Ok(ledger)
            }
            _ => {
                info!("No existing ledger state found in store, creating new ledger");
                Self::new(store, genesis_doc, config)
            }
        }
    }

    /// Create a fresh ledger from a genesis document.
    ///
    /// Both windows are seeded with the genesis validators. Duplicate public
    /// keys keep the power listed last.
    pub fn new(
        store: Arc<dyn Store>,
        genesis_doc: &GenesisDoc,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        let validators = Validators::from_powers(
            genesis_doc
                .validators
                .iter()
                .map(|v| (&v.public_key, v.power)),
        )?;

        let root = Root::new(genesis_doc);
        let window = ValidatorsRing::new(&validators, config.effective_window_size())?;
        let check_window = ValidatorsRing::new(&validators, config.effective_check_window_size())?;
        let tip = Tip::new(&root, window);

        Ok(Self {
            store,
            config,
            root,
            state: RwLock::new(LedgerState {
                tip,
                check_window,
                halted: false,
            }),
        })
    }

    /// Rebuild a ledger from its encoded state.
    pub fn decode(
        store: Arc<dyn Store>,
        bytes: &[u8],
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        Self::from_persisted(store, PersistedState::decode(bytes)?, config)
    }

    /// Build from the embedded genesis document, then overwrite the tip.
    ///
    /// The check window is restored from the persisted delivery window, so
    /// it takes that window's size.
    fn from_persisted(
        store: Arc<dyn Store>,
        persisted: PersistedState,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        let ledger = Self::new(store, &persisted.genesis_doc, config)?;
        {
            let mut state = ledger.state.write();
            state.check_window = ValidatorsRing::from_persisted(&persisted.validator_window)?;
            state.tip.restore(
                ValidatorsRing::from_persisted(&persisted.validator_window)?,
                persisted.last_block_height,
                Duration::from_millis(persisted.last_block_time),
                persisted.last_block_hash,
                persisted.app_hash_after_last_block,
            );
        }
        Ok(ledger)
    }

    /// Encode the current state as it would be checkpointed.
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        let state = self.state.read();
        self.persistable(&state).encode()
    }

    fn persistable(&self, state: &LedgerState) -> PersistedState {
        PersistedState {
            genesis_doc: self.root.genesis_doc().clone(),
            app_hash_after_last_block: state.tip.app_hash_after_last_block(),
            last_block_height: state.tip.last_block_height(),
            last_block_hash: state.tip.last_block_hash(),
            last_block_time: duration_to_millis(state.tip.last_block_time()),
            validator_window: state.tip.window().persistable(),
        }
    }

    fn save(&self, state: &LedgerState) -> Result<(), LedgerError> {
        let bytes = self.persistable(state).encode()?;
        self.store.set_sync(self.config.state_key.as_bytes(), &bytes)?;
        trace!(
            height = state.tip.last_block_height().0,
            bytes = bytes.len(),
            "Checkpointed ledger state"
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Commit
    // ═══════════════════════════════════════════════════════════════════════════

    /// Commit a block agreed by consensus.
    ///
    /// `block_time` is the block's timestamp since the Unix epoch. Returns the
    /// rotation summary of the delivery window.
    pub fn commit_block(
        &self,
        block_time: Duration,
        block_hash: Hash,
        app_hash: Hash,
    ) -> Result<RotationSummary, LedgerError> {
        let mut state = self.state.write();
        if state.halted {
            return Err(LedgerError::Halted);
        }

        // Checkpoint on the previous block
        self.save(&state)?;

        let max_flow = state.tip.window().max_flow();
        let mut window = state.tip.window().clone();
        let summary = window.rotate()?;
        let mut check_window = state.check_window.clone();
        check_window.rotate()?;

        if summary.total_flow > max_flow {
            error!(
                height = state.tip.last_block_height().next().0,
                total_flow = summary.total_flow,
                max_flow,
                "Validator flow exceeds one third of power, halting ledger"
            );
            state.halted = true;
            return Err(LedgerError::UnsafeValidatorTransition {
                total_flow: summary.total_flow,
                max_flow,
            });
        }

        state.check_window = check_window;
        state.tip.advance(window, block_time, block_hash, app_hash, now());

        debug!(
            height = state.tip.last_block_height().0,
            block_hash = ?block_hash,
            total_power_change = summary.total_power_change,
            total_flow = summary.total_flow,
            "Committed block"
        );
        Ok(summary)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Validator Changes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Change a validator's power for the next committed set.
    ///
    /// Returns the flow induced by the change.
    pub fn alter_power(&self, public_key: &PublicKey, power: u64) -> Result<u64, LedgerError> {
        self.alter_window_power(WindowKind::Delivery, public_key, power)
    }

    /// Writer applying changes to the delivery window.
    pub fn validator_writer(&self) -> ValidatorHandle<'_> {
        ValidatorHandle {
            ledger: self,
            kind: WindowKind::Delivery,
        }
    }

    /// Writer applying changes to the check window.
    ///
    /// Changes made through the checker never reach the committed set.
    pub fn validator_checker(&self) -> ValidatorHandle<'_> {
        ValidatorHandle {
            ledger: self,
            kind: WindowKind::Check,
        }
    }

    fn alter_window_power(
        &self,
        kind: WindowKind,
        public_key: &PublicKey,
        power: u64,
    ) -> Result<u64, LedgerError> {
        let mut state = self.state.write();
        if state.halted {
            return Err(LedgerError::Halted);
        }
        let window = match kind {
            WindowKind::Delivery => state.tip.window_mut(),
            WindowKind::Check => &mut state.check_window,
        };
        Ok(window.alter_power(public_key, power)?)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn genesis_hash(&self) -> Hash {
        self.root.genesis_hash()
    }

    pub fn genesis_doc(&self) -> &GenesisDoc {
        self.root.genesis_doc()
    }

    pub fn chain_id(&self) -> &str {
        &self.root.genesis_doc().chain_id
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn last_block_height(&self) -> BlockHeight {
        self.state.read().tip.last_block_height()
    }

    pub fn last_block_time(&self) -> Duration {
        self.state.read().tip.last_block_time()
    }

    /// Wall clock time of the last commit. Not persisted.
    pub fn last_commit_time(&self) -> Duration {
        self.state.read().tip.last_commit_time()
    }

    pub fn last_block_hash(&self) -> Hash {
        self.state.read().tip.last_block_hash()
    }

    pub fn app_hash_after_last_block(&self) -> Hash {
        self.state.read().tip.app_hash_after_last_block()
    }

    /// Copy of the last committed validator set.
    pub fn validators(&self) -> Validators {
        self.state.read().tip.validators()
    }

    /// Copy of the set being built for the next commit.
    pub fn pending_validators(&self) -> Validators {
        self.state.read().tip.pending_validators()
    }

    /// Copy of the set being built in the check window.
    pub fn pending_checked_validators(&self) -> Validators {
        self.state.read().check_window.head().clone()
    }

    pub fn validators_history(&self) -> ValidatorsHistory {
        self.state.read().tip.validators_history()
    }

    /// Number of committed validators with non-zero power.
    pub fn num_validators(&self) -> usize {
        self.state.read().tip.num_validators()
    }

    /// Visit the committed validators in address order until `f` returns
    /// true.
    ///
    /// Iterates over a copy, so `f` may call back into the ledger.
    pub fn iterate_validators<F>(&self, f: F) -> bool
    where
        F: FnMut(&PublicKey, u64) -> bool,
    {
        self.validators().iterate(f)
    }

    /// Whether an unsafe validator transition stopped the ledger.
    pub fn is_halted(&self) -> bool {
        self.state.read().halted
    }
}

/// Write handle onto one of the ledger's windows.
///
/// Takes the ledger's exclusive lock for every change.
pub struct ValidatorHandle<'a> {
    ledger: &'a Blockchain,
    kind: WindowKind,
}

impl ValidatorWriter for ValidatorHandle<'_> {
    type Error = LedgerError;

    fn alter_power(&mut self, public_key: &PublicKey, power: u64) -> Result<u64, LedgerError> {
        self.ledger.alter_window_power(self.kind, public_key, power)
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use meridian_test_helpers::test_genesis;
    use meridian_validators::ValidatorsError;
    use tracing_test::traced_test;

    fn new_ledger(powers: &[u64]) -> (Arc<MemoryStore>, GenesisDoc, Blockchain) {
        let store = Arc::new(MemoryStore::new());
        let genesis = test_genesis(powers);
        let ledger =
            Blockchain::load_or_new(store.clone(), &genesis, LedgerConfig::default()).unwrap();
        (store, genesis, ledger)
    }

    fn key(genesis: &GenesisDoc, i: usize) -> PublicKey {
        genesis.validators[i].public_key
    }

    fn block(n: u8) -> (Duration, Hash, Hash) {
        (
            Duration::from_secs(1_000 + n as u64),
            Hash::from_bytes(&[n, 0xB]),
            Hash::from_bytes(&[n, 0xA]),
        )
    }

    #[traced_test]
    #[test]
    fn test_new_ledger_from_genesis() {
        let (store, genesis, ledger) = new_ledger(&[100, 100, 100, 100]);

        assert!(logs_contain("No existing ledger state found"));
        // Nothing is written before the first commit
        assert!(store.is_empty());

        assert_eq!(ledger.genesis_hash(), genesis.hash());
        assert_eq!(ledger.chain_id(), genesis.chain_id);
        assert_eq!(ledger.last_block_height(), BlockHeight::GENESIS);
        assert_eq!(ledger.app_hash_after_last_block(), genesis.hash());
        assert_eq!(ledger.last_block_hash(), Hash::ZERO);
        assert_eq!(ledger.validators().total_power(), 400);
        assert_eq!(ledger.num_validators(), 4);
        assert_eq!(ledger.config().window_size, 10);
    }

    #[traced_test]
    #[test]
    fn test_commit_without_changes() {
        let (_, _, ledger) = new_ledger(&[100, 100, 100, 100]);
        let before = ledger.validators();

        for n in 1..=2u8 {
            let (time, hash, app_hash) = block(n);
            let summary = ledger.commit_block(time, hash, app_hash).unwrap();
            assert_eq!(summary.total_flow, 0);
            assert_eq!(summary.total_power_change, 0);
            assert_eq!(ledger.last_block_height(), BlockHeight(n as u64));
            assert_eq!(ledger.last_block_time(), time);
            assert_eq!(ledger.last_block_hash(), hash);
            assert_eq!(ledger.app_hash_after_last_block(), app_hash);
        }
        assert_eq!(ledger.validators(), before);
        assert!(logs_contain("Committed block"));
    }

    #[traced_test]
    #[test]
    fn test_flow_bound_through_ledger() {
        let (_, genesis, ledger) = new_ledger(&[100, 100, 100, 100]);

        assert_eq!(ledger.alter_power(&key(&genesis, 0), 0).unwrap(), 100);
        let err = ledger.alter_power(&key(&genesis, 1), 0).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validators(ValidatorsError::FlowExceeded {
                max_flow: 132,
                total_flow: 100,
                ..
            })
        ));
        assert!(!err.is_fatal());

        // The committed set only changes on commit
        assert_eq!(ledger.validators().total_power(), 400);
        assert_eq!(ledger.pending_validators().total_power(), 300);

        let (time, hash, app_hash) = block(1);
        let summary = ledger.commit_block(time, hash, app_hash).unwrap();
        assert_eq!(summary.total_power_change, -100);
        assert_eq!(summary.total_flow, 100);
        assert_eq!(ledger.validators().total_power(), 300);
        assert_eq!(ledger.validators().len(), 4);
        assert_eq!(ledger.num_validators(), 3);
    }

    #[test]
    fn test_checker_does_not_touch_committed_set() {
        let (_, genesis, ledger) = new_ledger(&[100, 100, 100, 100]);

        let mut checker = ledger.validator_checker();
        assert_eq!(checker.alter_power(&key(&genesis, 0), 50).unwrap(), 50);
        assert_eq!(ledger.pending_checked_validators().total_power(), 350);
        assert_eq!(ledger.pending_validators().total_power(), 400);

        let (time, hash, app_hash) = block(1);
        let summary = ledger.commit_block(time, hash, app_hash).unwrap();
        assert_eq!(summary.total_flow, 0);
        assert_eq!(ledger.validators().total_power(), 400);

        let mut writer = ledger.validator_writer();
        assert_eq!(writer.alter_power(&key(&genesis, 1), 120).unwrap(), 20);
        assert_eq!(ledger.pending_validators().total_power(), 420);
    }

    #[test]
    fn test_iterate_validators_in_address_order() {
        let (_, _, ledger) = new_ledger(&[5, 6, 7, 8, 9]);

        let mut visited = Vec::new();
        let stopped = ledger.iterate_validators(|public_key, power| {
            visited.push((public_key.address(), power));
            false
        });
        assert!(!stopped);
        assert_eq!(visited.len(), 5);
        assert!(visited.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(visited.iter().map(|(_, p)| p).sum::<u64>(), 35);

        // Callbacks can read the ledger
        assert!(ledger.iterate_validators(|_, _| ledger.num_validators() == 5));
    }

    #[test]
    fn test_encode_decode_restores_tip() {
        let (store, genesis, ledger) = new_ledger(&[100, 200, 300]);
        ledger.alter_power(&key(&genesis, 0), 150).unwrap();
        let (time, hash, app_hash) = block(1);
        ledger.commit_block(time, hash, app_hash).unwrap();
        ledger.alter_power(&key(&genesis, 1), 210).unwrap();

        let bytes = ledger.encode().unwrap();
        let restored = Blockchain::decode(store, &bytes, LedgerConfig::default()).unwrap();

        assert_eq!(restored.genesis_hash(), ledger.genesis_hash());
        assert_eq!(restored.last_block_height(), BlockHeight(1));
        assert_eq!(restored.last_block_hash(), hash);
        assert_eq!(restored.last_block_time(), time);
        assert_eq!(restored.app_hash_after_last_block(), app_hash);
        assert_eq!(restored.validators(), ledger.validators());
        assert_eq!(restored.pending_validators(), ledger.pending_validators());
        assert_eq!(restored.validators_history(), ledger.validators_history());
        assert_eq!(restored.encode().unwrap(), bytes);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = Blockchain::decode(
            Arc::new(MemoryStore::new()),
            &[1, 2, 3],
            LedgerConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, LedgerError::Decode(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_largest_genesis_commits_past_full_window() {
        let config = LedgerConfig::default();
        let capacity = u64::MAX / config.effective_window_size() as u64;

        let too_heavy = test_genesis(&[capacity + 1]);
        let err = Blockchain::new(Arc::new(MemoryStore::new()), &too_heavy, config.clone())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            LedgerError::Validators(ValidatorsError::CapacityExceeded { .. })
        ));

        let (_, genesis, ledger) = new_ledger(&[capacity]);
        for n in 1..=(config.window_size as u8 + 1) {
            let (time, hash, app_hash) = block(n);
            ledger.commit_block(time, hash, app_hash).unwrap();
        }
        assert!(matches!(
            ledger.alter_power(&key(&genesis, 0), capacity + 1),
            Err(LedgerError::Validators(ValidatorsError::CapacityExceeded { .. }))
        ));

        assert_eq!(ledger.alter_power(&key(&genesis, 0), capacity - 5).unwrap(), 5);
        for n in 20..=(20 + config.window_size as u8) {
            let (time, hash, app_hash) = block(n);
            ledger.commit_block(time, hash, app_hash).unwrap();
        }
        assert_eq!(ledger.validators().total_power(), capacity - 5);
        assert_eq!(
            ledger.last_block_height(),
            BlockHeight(2 * config.window_size as u64 + 2)
        );
    }

    #[test]
    fn test_last_commit_time_tracks_wall_clock() {
        let (store, genesis, ledger) = new_ledger(&[100, 100, 100]);
        let genesis_time = Duration::from_millis(genesis.genesis_time);
        assert_eq!(ledger.last_commit_time(), genesis_time);

        let started = now();
        let (time, hash, app_hash) = block(1);
        ledger.commit_block(time, hash, app_hash).unwrap();
        assert!(ledger.last_commit_time() >= started);
        assert!(ledger.last_commit_time() > genesis_time);

        // Commit time is not persisted, a restored ledger starts from genesis
        let restored =
            Blockchain::decode(store, &ledger.encode().unwrap(), LedgerConfig::default()).unwrap();
        assert_eq!(restored.last_block_height(), BlockHeight(1));
        assert_eq!(restored.last_commit_time(), genesis_time);
    }

    #[test]
    fn test_readers_see_consistent_height_and_set() {
        let (_, genesis, ledger) = new_ledger(&[100, 100, 100, 100]);
        let writer_key = key(&genesis, 0);
        let blocks = 200u64;

        // The committed power of the first validator is 100 + height
        std::thread::scope(|s| {
            s.spawn(|| {
                for n in 1..=blocks {
                    ledger.alter_power(&writer_key, 100 + n).unwrap();
                    ledger.commit_block(Duration::from_secs(n), Hash::ZERO, Hash::ZERO).unwrap();
                }
            });

            for _ in 0..4 {
                s.spawn(|| {
                    let mut last_height = BlockHeight::GENESIS;
                    while last_height.0 < blocks {
                        let history = ledger.validators_history();
                        assert!(history.height >= last_height);
                        assert_eq!(
                            history.current.power(&writer_key.address()),
                            100 + history.height.0
                        );
                        assert_eq!(history.buckets[1], history.current);
                        assert!(ledger.last_block_height() >= history.height);
                        assert!(ledger.validators().total_power() >= 400);
                        last_height = history.height;
                    }
                });
            }
        });

        assert_eq!(ledger.last_block_height(), BlockHeight(blocks));
        assert_eq!(ledger.validators().power(&writer_key.address()), 100 + blocks);
    }

    #[traced_test]
    #[test]
    fn test_unsafe_transition_halts_ledger() {
        let (store, genesis, ledger) = new_ledger(&[100, 100, 100, 100]);

        // Forge a state whose flow accumulator already exceeds the bound
        let mut persisted = PersistedState::decode(&ledger.encode().unwrap()).unwrap();
        let inflated = Validators::from_powers([(&key(&genesis, 0), 200)]).unwrap();
        persisted.validator_window.flow = inflated.encode();
        let config = LedgerConfig::default();
        store
            .set_sync(config.state_key.as_bytes(), &persisted.encode().unwrap())
            .unwrap();

        let ledger = Blockchain::load_or_new(store, &genesis, config).unwrap();
        let (time, hash, app_hash) = block(1);
        let err = ledger.commit_block(time, hash, app_hash).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::UnsafeValidatorTransition {
                total_flow: 200,
                max_flow: 132
            }
        ));
        assert!(err.is_fatal());
        assert!(ledger.is_halted());
        assert_eq!(ledger.last_block_height(), BlockHeight::GENESIS);
        assert!(logs_contain("halting ledger"));

        assert!(matches!(
            ledger.commit_block(time, hash, app_hash),
            Err(LedgerError::Halted)
        ));
        assert!(matches!(
            ledger.alter_power(&key(&genesis, 1), 100),
            Err(LedgerError::Halted)
        ));
    }
}
