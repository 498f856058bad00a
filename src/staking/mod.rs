//! Staking manager: the authoritative record of validators, delegations and
//! in-flight unbondings, and the only component allowed to mutate them
//! directly. The slasher and consensus engine go through the narrow
//! protected-interface methods at the bottom of this file rather than
//! reaching into validator/delegation state themselves.

use std::collections::HashMap;
use std::fmt;

use log::{info, warn};
use num_traits::Zero;

use crate::primitives::{is_zero, Address, Amount, Timestamp, BPS_DENOMINATOR};
use crate::types::{Delegation, SlashKind, SlashRecord, UnbondingDelegation, Validator, ValidatorMetadata};

#[derive(Debug, Clone)]
pub struct StakingConfig {
    pub min_validator_stake: Amount,
    pub min_delegator_stake: Amount,
    pub max_validators: usize,
    pub unbonding_period_seconds: i64,
    pub block_reward: Amount,
    pub inflation_rate_bps: u16,
    pub default_commission_rate_bps: u16,
}

#[derive(Debug, Clone)]
pub enum StakingEvent {
    ValidatorCreated { address: Address, self_stake: Amount },
    Delegated { delegator: Address, validator: Address, amount: Amount },
    Undelegated { delegator: Address, validator: Address, amount: Amount, completion_time: Timestamp },
    UnbondingCompleted { delegator: Address, validator: Address, amount: Amount },
    DelegationSlashed { delegator: Address, validator: Address, amount: Amount },
    ValidatorSlashed { validator: Address, kind: SlashKind, amount: Amount },
    Jailed { validator: Address, until: Timestamp },
    Unjailed { validator: Address },
    RewardsDistributed { block_height: u64, block_reward: Amount, validator_count: usize },
    RewardsClaimed { address: Address, amount: Amount },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    ValidatorNotFound,
    ValidatorExists,
    DelegationNotFound,
    InsufficientStake,
    ValidatorJailed,
    MaxValidatorsReached,
    InsufficientDelegation,
}

impl fmt::Display for StakingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakingError::ValidatorNotFound => write!(f, "validator not found"),
            StakingError::ValidatorExists => write!(f, "validator already registered"),
            StakingError::DelegationNotFound => write!(f, "delegation not found"),
            StakingError::InsufficientStake => write!(f, "stake is below the required minimum"),
            StakingError::ValidatorJailed => write!(f, "validator is jailed"),
            StakingError::MaxValidatorsReached => write!(f, "validator set is already at capacity"),
            StakingError::InsufficientDelegation => write!(f, "delegation balance is smaller than the requested amount"),
        }
    }
}

impl std::error::Error for StakingError {}

/// Key for a delegator/validator pair, used to index delegations and
/// unbondings in insertion-stable maps.
type DelegationKey = (Address, Address);

pub struct StakingManager {
    config: StakingConfig,
    validators: HashMap<Address, Validator>,
    delegations: HashMap<DelegationKey, Delegation>,
    unbondings: Vec<UnbondingDelegation>,
    history: HashMap<Address, Vec<SlashRecord>>,
    rewards: HashMap<Address, Amount>,
    total_staked: Amount,
}

impl StakingManager {
    pub fn new(config: StakingConfig) -> Self {
        StakingManager {
            config,
            validators: HashMap::new(),
            delegations: HashMap::new(),
            unbondings: Vec::new(),
            history: HashMap::new(),
            rewards: HashMap::new(),
            total_staked: Amount::zero(),
        }
    }

    pub fn register_validator(
        &mut self,
        address: Address,
        public_key: Vec<u8>,
        self_stake: Amount,
        commission_bps: u16,
        metadata: ValidatorMetadata,
    ) -> Result<StakingEvent, StakingError> {
        if self.validators.contains_key(&address) {
            return Err(StakingError::ValidatorExists);
        }
        if self_stake < self.config.min_validator_stake {
            return Err(StakingError::InsufficientStake);
        }
        if self.validators.len() >= self.config.max_validators {
            return Err(StakingError::MaxValidatorsReached);
        }

        let validator = Validator {
            address,
            public_key,
            voting_power: self_stake.clone(),
            commission_bps,
            jailed: false,
            jailed_until: 0,
            metadata,
        };
        self.validators.insert(address, validator);
        self.delegations.insert(
            (address, address),
            Delegation { delegator: address, validator: address, amount: self_stake.clone(), shares: self_stake.clone() },
        );
        self.rewards.insert(address, Amount::zero());
        self.total_staked += self_stake.clone();
        info!("registered validator {address:?} with self-stake {self_stake}");
        Ok(StakingEvent::ValidatorCreated { address, self_stake })
    }

    /// Adds `amount` to `delegator`'s stake in `validator`, crediting shares
    /// 1:1 and increasing the validator's voting power by the same amount.
    pub fn delegate(&mut self, delegator: Address, validator: Address, amount: Amount) -> Result<StakingEvent, StakingError> {
        if amount < self.config.min_delegator_stake {
            return Err(StakingError::InsufficientStake);
        }
        let v = self.validators.get_mut(&validator).ok_or(StakingError::ValidatorNotFound)?;
        if v.jailed {
            return Err(StakingError::ValidatorJailed);
        }
        v.voting_power += amount.clone();

        let entry = self
            .delegations
            .entry((delegator, validator))
            .or_insert_with(|| Delegation { delegator, validator, amount: Amount::zero(), shares: Amount::zero() });
        entry.amount += amount.clone();
        entry.shares += amount.clone();
        self.total_staked += amount.clone();

        info!("{delegator:?} delegated {amount} to {validator:?}");
        Ok(StakingEvent::Delegated { delegator, validator, amount })
    }

    /// Begins unbonding `amount` of `delegator`'s stake in `validator`,
    /// removing it from voting power immediately and queuing the payout for
    /// `now + unbonding_period_seconds`.
    pub fn undelegate(
        &mut self,
        delegator: Address,
        validator: Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<StakingEvent, StakingError> {
        let key = (delegator, validator);
        let delegation = self.delegations.get_mut(&key).ok_or(StakingError::DelegationNotFound)?;
        if delegation.amount < amount {
            return Err(StakingError::InsufficientDelegation);
        }
        let shares_removed = delegation.shares.clone() * amount.clone() / delegation.amount.clone();
        delegation.amount -= amount.clone();
        delegation.shares -= shares_removed;
        if is_zero(&delegation.amount) {
            self.delegations.remove(&key);
        }

        if let Some(v) = self.validators.get_mut(&validator) {
            v.voting_power -= amount.clone();
        }
        self.total_staked -= amount.clone();

        let completion_time = now + self.config.unbonding_period_seconds;
        self.unbondings.push(UnbondingDelegation { delegator, validator, amount: amount.clone(), completion_time });

        info!("{delegator:?} began unbonding {amount} from {validator:?}, completes at {completion_time}");
        Ok(StakingEvent::Undelegated { delegator, validator, amount, completion_time })
    }

    /// Releases every unbonding entry whose `completion_time` has passed,
    /// returning one event per entry released.
    pub fn process_unbonding(&mut self, now: Timestamp) -> Vec<StakingEvent> {
        let (ready, pending): (Vec<_>, Vec<_>) = self.unbondings.drain(..).partition(|u| u.completion_time <= now);
        self.unbondings = pending;

        ready
            .into_iter()
            .map(|u| {
                info!("released unbonding of {} for {:?} from {:?}", u.amount, u.delegator, u.validator);
                StakingEvent::UnbondingCompleted { delegator: u.delegator, validator: u.validator, amount: u.amount }
            })
            .collect()
    }

    /// Splits `block_reward` across every active (non-jailed, non-zero-power)
    /// validator proportional to voting power, then splits each validator's
    /// share into a commission credited to the validator and a remainder
    /// credited to its delegators pro-rata by share. Credits land in
    /// `rewards`, not in delegation balances — claiming is a separate step.
    /// A reward-less block (no active validators) is a silent no-op, not an
    /// error.
    pub fn distribute_rewards(&mut self, block_height: u64, block_reward: Amount) -> StakingEvent {
        let active: Vec<Address> = self
            .validators
            .values()
            .filter(|v| !v.jailed && !is_zero(&v.voting_power))
            .map(|v| v.address)
            .collect();
        let total_active_power: Amount = active.iter().map(|a| self.validators[a].voting_power.clone()).fold(Amount::zero(), |acc, p| acc + p);

        if active.is_empty() || is_zero(&total_active_power) {
            return StakingEvent::RewardsDistributed { block_height, block_reward: Amount::zero(), validator_count: 0 };
        }

        for address in &active {
            let v = &self.validators[address];
            let v_reward = block_reward.clone() * v.voting_power.clone() / total_active_power.clone();
            let commission = v_reward.clone() * Amount::from(v.commission_bps) / Amount::from(BPS_DENOMINATOR);
            let remaining = v_reward - commission.clone();
            let pool_total = v.voting_power.clone();

            *self.rewards.entry(*address).or_insert_with(Amount::zero) += commission;

            if !is_zero(&pool_total) {
                let shares: Vec<(Address, Amount)> = self
                    .delegations
                    .iter()
                    .filter(|((_, val), _)| val == address)
                    .map(|(_, d)| (d.delegator, d.shares.clone()))
                    .collect();
                for (delegator, delegator_shares) in shares {
                    let share = remaining.clone() * delegator_shares / pool_total.clone();
                    *self.rewards.entry(delegator).or_insert_with(Amount::zero) += share;
                }
            }
        }

        info!("distributed block reward {block_reward} at height {block_height} across {} active validators", active.len());
        StakingEvent::RewardsDistributed { block_height, block_reward, validator_count: active.len() }
    }

    /// Returns `rewards[address]` and resets it to zero. A zero balance
    /// returns zero without mutating state or signalling an event.
    pub fn claim_rewards(&mut self, address: Address) -> (Amount, Option<StakingEvent>) {
        let balance = self.rewards.get(&address).cloned().unwrap_or_else(Amount::zero);
        if is_zero(&balance) {
            return (Amount::zero(), None);
        }
        self.rewards.insert(address, Amount::zero());
        info!("{address:?} claimed {balance} in rewards");
        (balance.clone(), Some(StakingEvent::RewardsClaimed { address, amount: balance }))
    }

    pub fn get_rewards(&self, address: &Address) -> Amount {
        self.rewards.get(address).cloned().unwrap_or_else(Amount::zero)
    }

    pub fn get_total_staked(&self) -> Amount {
        self.total_staked.clone()
    }

    pub fn get_validator(&self, address: &Address) -> Option<Validator> {
        self.validators.get(address).cloned()
    }

    pub fn all_validators(&self) -> Vec<Validator> {
        self.validators.values().cloned().collect()
    }

    pub fn get_delegation(&self, delegator: &Address, validator: &Address) -> Option<Delegation> {
        self.delegations.get(&(*delegator, *validator)).cloned()
    }

    pub fn delegations_for(&self, delegator: &Address) -> Vec<Delegation> {
        self.delegations.values().filter(|d| d.delegator == *delegator).cloned().collect()
    }

    pub fn pending_unbondings_for(&self, delegator: &Address) -> Vec<UnbondingDelegation> {
        self.unbondings.iter().filter(|u| u.delegator == *delegator).cloned().collect()
    }

    pub fn slashing_history(&self, validator: &Address) -> Vec<SlashRecord> {
        self.history.get(validator).cloned().unwrap_or_default()
    }

    // --- Protected interface: only the slasher and consensus engine reach these. ---

    /// Reduces `validator`'s voting power by `amount`, pro-rata reduces every
    /// delegation's `amount` in the same proportion, and records the event
    /// in the validator's slashing history. Does not itself jail — callers
    /// (the slasher) decide jailing separately via `set_jail`.
    ///
    /// Returns one `DelegationSlashed` event per affected delegation
    /// followed by a single `ValidatorSlashed` event, in that order.
    pub(crate) fn apply_slash(&mut self, validator: Address, amount: Amount, kind: SlashKind, reason: &str, height: u64, now: Timestamp) -> Vec<StakingEvent> {
        let Some(v) = self.validators.get_mut(&validator) else { return Vec::new() };
        let pre_power = v.voting_power.clone();
        if is_zero(&pre_power) {
            return Vec::new();
        }
        let slashed = amount.min(pre_power.clone());
        v.voting_power -= slashed.clone();

        let mut drained = Amount::zero();
        let mut emptied: Vec<DelegationKey> = Vec::new();
        let mut events = Vec::new();
        for (key, delegation) in self.delegations.iter_mut() {
            if key.1 != validator {
                continue;
            }
            let amount_pre = delegation.amount.clone();
            let reduction = amount_pre.clone() * slashed.clone() / pre_power.clone();
            let shares_reduction = delegation.shares.clone() * reduction.clone() / amount_pre;
            delegation.amount -= reduction.clone();
            delegation.shares -= shares_reduction;
            drained += reduction.clone();
            if !is_zero(&reduction) {
                events.push(StakingEvent::DelegationSlashed { delegator: delegation.delegator, validator, amount: reduction });
            }
            if is_zero(&delegation.amount) {
                emptied.push(*key);
            }
        }
        for key in emptied {
            self.delegations.remove(&key);
        }
        self.total_staked -= drained;

        self.history.entry(validator).or_default().push(SlashRecord {
            height,
            kind,
            amount: slashed.clone(),
            reason: reason.to_string(),
            timestamp: now,
        });
        warn!("slashed validator {validator:?} for {slashed} ({kind:?}) at height {height}");
        events.push(StakingEvent::ValidatorSlashed { validator, kind, amount: slashed });
        events
    }

    pub(crate) fn set_jail(&mut self, validator: Address, jailed: bool, until: Timestamp) -> Option<StakingEvent> {
        let v = self.validators.get_mut(&validator)?;
        v.jailed = jailed;
        v.jailed_until = until;
        Some(if jailed { StakingEvent::Jailed { validator, until } } else { StakingEvent::Unjailed { validator } })
    }

    pub(crate) fn is_jailed(&self, validator: &Address) -> bool {
        self.validators.get(validator).map(|v| v.jailed).unwrap_or(false)
    }

    pub(crate) fn jailed_until(&self, validator: &Address) -> Option<Timestamp> {
        self.validators.get(validator).map(|v| v.jailed_until)
    }

    pub(crate) fn voting_power_of(&self, validator: &Address) -> Amount {
        self.validators.get(validator).map(|v| v.voting_power.clone()).unwrap_or_else(Amount::zero)
    }
}
