//! Consensus engine: round-robin proposer rotation, block production,
//! signature verification, and epoch transitions.
//!
//! Three cooperative loops run while the engine is `Validating` — producer,
//! epoch, and event dispatch — each honouring the same cancellation signal,
//! mirroring the reference binary's `tokio::select!`-driven background
//! tasks guarding `AppState`'s locked blockchain/consensus state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{info, warn};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval, Duration};

use crate::blockchain::block::Header;
use crate::blockchain::{Block, Transaction};
use crate::crypto::KeyPair;
use crate::external::{Keystore, TransactionPool};
use crate::primitives::{Address, Amount, Hash, Timestamp};
use crate::slashing::Slasher;
use crate::staking::StakingManager;
use crate::validator_set::ValidatorSet;

pub const DEFAULT_GAS_LIMIT: u64 = 30_000_000;
/// Future-drift tolerance a proposed block's timestamp may exceed `now` by.
pub const TIMESTAMP_DRIFT_TOLERANCE_SECONDS: i64 = 10;
/// Capacity of the internal event channel; overflow drops and logs rather
/// than blocking the mutating operation that produced the event.
const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    pub chain_id: u64,
    pub block_time: Duration,
    pub epoch_length: u64,
    pub block_reward: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Validating,
}

#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    ValidatorSetUpdated { hash: Hash },
    EpochTransition { epoch: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    AlreadyValidating,
    NotValidating,
    NotProposer,
    UnknownProposer,
    InvalidValidatorSetHash,
    TimestampFuture,
    InvalidSignature,
    MissingSignature,
    NoValidatorKey,
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::AlreadyValidating => write!(f, "engine is already validating"),
            ConsensusError::NotValidating => write!(f, "engine is not validating"),
            ConsensusError::NotProposer => write!(f, "this node is not the proposer for the requested height"),
            ConsensusError::UnknownProposer => write!(f, "block's proposer is not a known validator"),
            ConsensusError::InvalidValidatorSetHash => write!(f, "header's validator_set_hash does not match the current set"),
            ConsensusError::TimestampFuture => write!(f, "header timestamp is too far in the future"),
            ConsensusError::InvalidSignature => write!(f, "header signature does not recover to the proposer"),
            ConsensusError::MissingSignature => write!(f, "header carries no signature"),
            ConsensusError::NoValidatorKey => write!(f, "node has no validator key configured"),
        }
    }
}

impl std::error::Error for ConsensusError {}

pub struct ConsensusEngine {
    config: ConsensusConfig,
    validator_set: Arc<RwLock<ValidatorSet>>,
    staking: Arc<RwLock<StakingManager>>,
    slasher: Arc<RwLock<Slasher>>,
    keystore: Arc<dyn Keystore>,
    tx_pool: Arc<dyn TransactionPool>,
    state: RwLock<EngineState>,
    epoch: AtomicU64,
    event_tx: mpsc::Sender<ConsensusEvent>,
    event_rx: RwLock<Option<mpsc::Receiver<ConsensusEvent>>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl ConsensusEngine {
    pub fn new(
        config: ConsensusConfig,
        validator_set: Arc<RwLock<ValidatorSet>>,
        staking: Arc<RwLock<StakingManager>>,
        slasher: Arc<RwLock<Slasher>>,
        keystore: Arc<dyn Keystore>,
        tx_pool: Arc<dyn TransactionPool>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);
        ConsensusEngine {
            config,
            validator_set,
            staking,
            slasher,
            keystore,
            tx_pool,
            state: RwLock::new(EngineState::Idle),
            epoch: AtomicU64::new(0),
            event_tx,
            event_rx: RwLock::new(Some(event_rx)),
            stop_tx,
            stop_rx,
        }
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Transitions to `Validating` and spawns the producer, epoch, and
    /// event loops. Each loop holds its own clone of `self` and exits on
    /// the shared stop signal.
    pub async fn start(self: &Arc<Self>) -> Result<(), ConsensusError> {
        {
            let mut state = self.state.write().await;
            if *state == EngineState::Validating {
                return Err(ConsensusError::AlreadyValidating);
            }
            *state = EngineState::Validating;
        }

        let mut event_rx = self.event_rx.write().await.take().expect("event receiver taken exactly once per start");

        let producer_engine = Arc::clone(self);
        let mut producer_stop = self.stop_rx.clone();
        tokio::spawn(async move {
            let mut ticker = interval(producer_engine.config.block_time);
            loop {
                tokio::select! {
                    _ = ticker.tick() => producer_engine.producer_tick().await,
                    _ = producer_stop.changed() => break,
                }
            }
        });

        let epoch_engine = Arc::clone(self);
        let mut epoch_stop = self.stop_rx.clone();
        tokio::spawn(async move {
            let period = epoch_engine.config.block_time * epoch_engine.config.epoch_length as u32;
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => epoch_engine.next_epoch().await,
                    _ = epoch_stop.changed() => break,
                }
            }
        });

        let mut events_stop = self.stop_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = event_rx.recv() => info!("consensus event: {event:?}"),
                    _ = events_stop.changed() => break,
                }
            }
        });

        Ok(())
    }

    pub async fn stop(&self) -> Result<(), ConsensusError> {
        let mut state = self.state.write().await;
        if *state != EngineState::Validating {
            return Err(ConsensusError::NotValidating);
        }
        *state = EngineState::Idle;
        let _ = self.stop_tx.send(true);
        Ok(())
    }

    async fn producer_tick(&self) {
        let Some(key) = self.keystore.validator_key() else { return };
        let number = self.next_block_number().await;
        let proposer = self.validator_set.read().await.get_proposer(number).map(|v| v.address);
        if proposer != Some(key.address()) {
            return;
        }
        let txs = self.tx_pool.pending().await;
        match self.propose_block(Hash::zero(), number, txs.clone(), &key).await {
            Ok(block) => {
                self.tx_pool.remove(&txs).await;
                self.finalize_block(&block).await;
            }
            Err(err) => warn!("failed to produce block {number}: {err}"),
        }
    }

    /// Drives the reward/liveness side effects of a finalized block: credits
    /// the configured block reward across the active validator set, records
    /// every active validator's signing activity for this height (the
    /// proposer as signed, everyone else as missed), and slashes any
    /// validator whose downtime threshold is crossed as a result.
    async fn finalize_block(&self, block: &Block) {
        let height = block.header.number;
        let active: Vec<Address> = self.validator_set.read().await.snapshot(height).validators.iter().map(|v| v.address).collect();

        {
            let mut staking = self.staking.write().await;
            staking.distribute_rewards(height, self.config.block_reward.clone());
        }

        let now = unix_now();
        let mut slasher = self.slasher.write().await;
        for address in &active {
            slasher.track_activity(*address, height, *address == block.header.proposer);
        }
        let mut staking = self.staking.write().await;
        for address in &active {
            if slasher.check_downtime(&staking, address) {
                if let Err(err) = slasher.slash_downtime(&mut staking, *address, height, now) {
                    warn!("failed to slash {address:?} for downtime at height {height}: {err}");
                }
            }
        }
    }

    /// Stand-in for a real chain head lookup: callers supply `parent_hash`
    /// directly, and this only picks the next sequence number to attempt.
    async fn next_block_number(&self) -> u64 {
        1
    }

    pub async fn propose_block(&self, parent_hash: Hash, number: u64, txs: Vec<Transaction>, key: &KeyPair) -> Result<Block, ConsensusError> {
        let validator_set = self.validator_set.read().await;
        let proposer = validator_set.get_proposer(number).ok_or(ConsensusError::UnknownProposer)?;
        if proposer.address != key.address() {
            return Err(ConsensusError::NotProposer);
        }

        let header = Header {
            parent_hash,
            number,
            timestamp: unix_now(),
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_used: 0,
            state_root: Hash::zero(),
            tx_root: Block::compute_tx_root(&txs),
            receipt_root: Hash::zero(),
            validator_set_hash: validator_set.hash(),
            proposer: proposer.address,
            signature: None,
            extra: Vec::new(),
        };
        let validator_list = validator_set.snapshot(number).validators;
        drop(validator_set);

        let mut block = Block::new(header, txs, validator_list);
        self.sign_block(&mut block, key);

        self.emit(ConsensusEvent::ValidatorSetUpdated { hash: block.header.validator_set_hash }).await;
        Ok(block)
    }

    fn sign_block(&self, block: &mut Block, key: &KeyPair) {
        block.header.signature = None;
        let hash = block.header.signing_hash();
        block.header.signature = Some(key.sign_prehash(hash.as_fixed_bytes()));
    }

    /// Validates an incoming block against the engine's current validator
    /// set: the proposer must be known, the header's `validator_set_hash`
    /// must match, the timestamp must not be too far in the future, and the
    /// signature must recover to the proposer.
    pub async fn validate_block(&self, block: &Block, now: Timestamp) -> Result<(), ConsensusError> {
        let validator_set = self.validator_set.read().await;
        if validator_set.get_by_address(&block.header.proposer).is_none() {
            return Err(ConsensusError::UnknownProposer);
        }
        if block.header.validator_set_hash != validator_set.hash() {
            return Err(ConsensusError::InvalidValidatorSetHash);
        }
        if block.header.timestamp > now + TIMESTAMP_DRIFT_TOLERANCE_SECONDS {
            return Err(ConsensusError::TimestampFuture);
        }
        let signature = block.header.signature.ok_or(ConsensusError::MissingSignature)?;
        let hash = block.header.signing_hash();
        let recovered = signature.recover_address(hash.as_fixed_bytes()).map_err(|_| ConsensusError::InvalidSignature)?;
        if recovered != block.header.proposer {
            return Err(ConsensusError::InvalidSignature);
        }
        Ok(())
    }

    pub async fn next_epoch(&self) {
        self.validator_set.write().await.update_for_new_epoch();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let hash = self.validator_set.read().await.hash();
        self.emit(ConsensusEvent::EpochTransition { epoch }).await;
        self.emit(ConsensusEvent::ValidatorSetUpdated { hash }).await;
    }

    async fn emit(&self, event: ConsensusEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("consensus event channel full, dropping event");
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }
}

fn unix_now() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{NullTransactionPool};
    use crate::types::{Validator, ValidatorMetadata};

    struct SingleKeyKeystore(KeyPair);
    impl Keystore for SingleKeyKeystore {
        fn validator_key(&self) -> Option<KeyPair> {
            Some(self.0.clone())
        }
    }

    fn staking_config() -> crate::staking::StakingConfig {
        crate::staking::StakingConfig {
            min_validator_stake: crate::primitives::Amount::from(1u32),
            min_delegator_stake: crate::primitives::Amount::from(1u32),
            max_validators: 125,
            unbonding_period_seconds: 21 * 24 * 3600,
            block_reward: crate::primitives::Amount::from(40u32),
            inflation_rate_bps: 0,
            default_commission_rate_bps: 0,
        }
    }

    fn slasher_config() -> crate::slashing::SlasherConfig {
        crate::slashing::SlasherConfig {
            downtime_slash_bps: 100,
            double_sign_slash_bps: 500,
            downtime_jail_seconds: 24 * 3600,
            missed_block_threshold: 50,
            signing_window: 1_000,
            min_slash_amount: crate::primitives::Amount::from(1u32),
        }
    }

    async fn engine_with_single_validator() -> (Arc<ConsensusEngine>, KeyPair) {
        let key = KeyPair::generate();
        let mut set = ValidatorSet::new(125);
        let mut staking = StakingManager::new(staking_config());
        staking
            .register_validator(key.address(), Vec::new(), crate::primitives::Amount::from(100u32), 0, ValidatorMetadata::default())
            .unwrap();
        set.add(Validator {
            address: key.address(),
            public_key: Vec::new(),
            voting_power: crate::primitives::Amount::from(100u32),
            commission_bps: 0,
            jailed: false,
            jailed_until: 0,
            metadata: ValidatorMetadata::default(),
        });
        let engine = Arc::new(ConsensusEngine::new(
            ConsensusConfig { chain_id: 1337, block_time: Duration::from_secs(1), epoch_length: 10, block_reward: crate::primitives::Amount::from(40u32) },
            Arc::new(RwLock::new(set)),
            Arc::new(RwLock::new(staking)),
            Arc::new(RwLock::new(Slasher::new(slasher_config()))),
            Arc::new(SingleKeyKeystore(key.clone())),
            Arc::new(NullTransactionPool),
        ));
        (engine, key)
    }

    #[tokio::test]
    async fn sign_then_validate_round_trips_for_the_correct_proposer() {
        let (engine, key) = engine_with_single_validator().await;
        let block = engine.propose_block(Hash::zero(), 0, Vec::new(), &key).await.unwrap();
        assert!(engine.validate_block(&block, unix_now()).await.is_ok());
    }

    #[tokio::test]
    async fn propose_block_rejects_a_non_proposer_key() {
        let (engine, _) = engine_with_single_validator().await;
        let stranger = KeyPair::generate();
        let err = engine.propose_block(Hash::zero(), 0, Vec::new(), &stranger).await.unwrap_err();
        assert_eq!(err, ConsensusError::NotProposer);
    }

    #[tokio::test]
    async fn validate_block_rejects_future_timestamps() {
        let (engine, key) = engine_with_single_validator().await;
        let mut block = engine.propose_block(Hash::zero(), 0, Vec::new(), &key).await.unwrap();
        block.header.timestamp = unix_now() + 1_000;
        engine.sign_block(&mut block, &key);
        let err = engine.validate_block(&block, unix_now()).await.unwrap_err();
        assert_eq!(err, ConsensusError::TimestampFuture);
    }

    #[tokio::test]
    async fn finalize_block_distributes_rewards_and_tracks_proposer_liveness() {
        let (engine, key) = engine_with_single_validator().await;
        let block = engine.propose_block(Hash::zero(), 0, Vec::new(), &key).await.unwrap();
        engine.finalize_block(&block).await;

        let reward = engine.staking.read().await.get_rewards(&key.address());
        assert_eq!(reward, crate::primitives::Amount::from(40u32));

        // The sole validator signed, so it should not be flagged for downtime.
        let staking = engine.staking.read().await;
        assert!(!engine.slasher.read().await.check_downtime(&staking, &key.address()));
    }

    #[tokio::test]
    async fn finalize_block_slashes_a_validator_missing_enough_blocks() {
        let (engine, key) = engine_with_single_validator().await;
        let block = engine.propose_block(Hash::zero(), 0, Vec::new(), &key).await.unwrap();

        let other = Address::from_low_u64_be(99);
        engine.validator_set.write().await.add(Validator {
            address: other,
            public_key: Vec::new(),
            voting_power: crate::primitives::Amount::from(100u32),
            commission_bps: 0,
            jailed: false,
            jailed_until: 0,
            metadata: ValidatorMetadata::default(),
        });
        engine.staking.write().await.register_validator(other, Vec::new(), crate::primitives::Amount::from(100u32), 0, ValidatorMetadata::default()).unwrap();

        for h in 0..slasher_config().missed_block_threshold {
            let mut b = block.clone();
            b.header.number = h;
            engine.finalize_block(&b).await;
        }

        assert!(engine.staking.read().await.is_jailed(&other));
    }

    #[tokio::test]
    async fn start_then_stop_transitions_engine_state() {
        let (engine, _) = engine_with_single_validator().await;
        engine.start().await.unwrap();
        assert_eq!(engine.state().await, EngineState::Validating);
        assert_eq!(engine.start().await, Err(ConsensusError::AlreadyValidating));
        engine.stop().await.unwrap();
        assert_eq!(engine.state().await, EngineState::Idle);
    }
}
