//! Slasher: tracks liveness and double-sign evidence and drives punishment
//! through the staking manager's protected interface. It never touches
//! `Validator`/`Delegation` fields directly — everything goes through
//! `StakingManager::apply_slash`/`set_jail` so the ledger stays the single
//! source of truth for voting power.

use std::collections::HashMap;
use std::fmt;

use log::warn;

use crate::crypto::RecoverableSignature;
use crate::primitives::{Address, Amount, Hash, Timestamp, BPS_DENOMINATOR};
use crate::staking::StakingManager;
use crate::types::SlashKind;

#[derive(Debug, Clone)]
pub struct SlasherConfig {
    pub downtime_slash_bps: u16,
    pub double_sign_slash_bps: u16,
    pub downtime_jail_seconds: i64,
    /// Consecutive missed blocks before a validator is slashed for downtime.
    pub missed_block_threshold: u64,
    /// Sliding window size (in blocks) the missed-block counter resets over.
    pub signing_window: u64,
    /// Floor applied to every computed slash amount, capped at the
    /// validator's own voting power so a floor can never slash more than it has.
    pub min_slash_amount: Amount,
}

/// Proof a validator signed two different blocks at the same height.
/// `signature_a`/`signature_b` must each recover to `validator` over
/// `hash_a`/`hash_b` respectively for the evidence to be accepted.
#[derive(Debug, Clone)]
pub struct DoubleSignEvidence {
    pub validator: Address,
    pub height: u64,
    pub hash_a: Hash,
    pub hash_b: Hash,
    pub signature_a: RecoverableSignature,
    pub signature_b: RecoverableSignature,
}

#[derive(Debug, Clone)]
pub enum SlashEvent {
    DowntimeSlashed { validator: Address, amount: Amount, jailed_until: Timestamp },
    DoubleSignSlashed { validator: Address, amount: Amount },
    Unjailed { validator: Address },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashError {
    ValidatorNotFound,
    AlreadyJailed,
    NotJailed,
    StillJailed,
    PermanentlyJailed,
    InvalidDoubleSignEvidence,
}

impl fmt::Display for SlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlashError::ValidatorNotFound => write!(f, "validator not found"),
            SlashError::AlreadyJailed => write!(f, "validator is already jailed"),
            SlashError::NotJailed => write!(f, "validator is not jailed"),
            SlashError::StillJailed => write!(f, "jail period has not elapsed"),
            SlashError::PermanentlyJailed => write!(f, "validator is permanently jailed"),
            SlashError::InvalidDoubleSignEvidence => write!(f, "double-sign evidence does not prove the accused validator signed two distinct blocks"),
        }
    }
}

impl std::error::Error for SlashError {}

struct Liveness {
    missed: u64,
    window_start_height: u64,
}

pub struct Slasher {
    config: SlasherConfig,
    liveness: HashMap<Address, Liveness>,
}

impl Slasher {
    pub fn new(config: SlasherConfig) -> Self {
        Slasher { config, liveness: HashMap::new() }
    }

    /// Records whether `validator` signed at `height`, resetting the sliding
    /// window once it has rolled past `signing_window` blocks.
    pub fn track_activity(&mut self, validator: Address, height: u64, signed: bool) {
        let entry = self.liveness.entry(validator).or_insert(Liveness { missed: 0, window_start_height: height });
        if height.saturating_sub(entry.window_start_height) >= self.config.signing_window {
            entry.missed = 0;
            entry.window_start_height = height;
        }
        if signed {
            entry.missed = 0;
        } else {
            entry.missed += 1;
        }
    }

    /// Returns `true` once `validator` has missed `missed_block_threshold`
    /// consecutive blocks within the current window and is not already jailed.
    pub fn check_downtime(&self, staking: &StakingManager, validator: &Address) -> bool {
        if staking.is_jailed(validator) {
            return false;
        }
        self.liveness.get(validator).map(|l| l.missed >= self.config.missed_block_threshold).unwrap_or(false)
    }

    /// Floors `amount` at `min_slash_amount`, then caps the result at `power`
    /// so the floor can never slash more than the validator actually has.
    fn floor_and_cap(&self, amount: Amount, power: &Amount) -> Amount {
        amount.max(self.config.min_slash_amount.clone()).min(power.clone())
    }

    /// Slashes `validator` for downtime and jails it for
    /// `downtime_jail_seconds`, resetting its missed-block counter.
    pub fn slash_downtime(
        &mut self,
        staking: &mut StakingManager,
        validator: Address,
        height: u64,
        now: Timestamp,
    ) -> Result<SlashEvent, SlashError> {
        let power = staking.voting_power_of(&validator);
        if power == Amount::from(0u32) {
            return Err(SlashError::ValidatorNotFound);
        }
        if staking.is_jailed(&validator) {
            return Err(SlashError::AlreadyJailed);
        }
        let raw = power.clone() * Amount::from(self.config.downtime_slash_bps) / Amount::from(BPS_DENOMINATOR);
        let amount = self.floor_and_cap(raw, &power);
        let _events = staking.apply_slash(validator, amount.clone(), SlashKind::Downtime, "missed block threshold exceeded", height, now);

        let until = now + self.config.downtime_jail_seconds;
        staking.set_jail(validator, true, until);
        if let Some(l) = self.liveness.get_mut(&validator) {
            l.missed = 0;
        }

        warn!("validator {validator:?} jailed for downtime until {until}");
        Ok(SlashEvent::DowntimeSlashed { validator, amount, jailed_until: until })
    }

    /// Validates that the evidence names two distinct block hashes at the
    /// same height, with a nonzero height, and that both signatures recover
    /// to the accused validator's address.
    pub fn validate_evidence(&self, evidence: &DoubleSignEvidence) -> Result<(), SlashError> {
        if evidence.height == 0 {
            return Err(SlashError::InvalidDoubleSignEvidence);
        }
        if evidence.hash_a == evidence.hash_b {
            return Err(SlashError::InvalidDoubleSignEvidence);
        }
        let recovered_a = evidence.signature_a.recover_address(evidence.hash_a.as_fixed_bytes()).map_err(|_| SlashError::InvalidDoubleSignEvidence)?;
        let recovered_b = evidence.signature_b.recover_address(evidence.hash_b.as_fixed_bytes()).map_err(|_| SlashError::InvalidDoubleSignEvidence)?;
        if recovered_a != evidence.validator || recovered_b != evidence.validator {
            return Err(SlashError::InvalidDoubleSignEvidence);
        }
        Ok(())
    }

    /// Slashes `validator` for double-signing and jails it permanently
    /// (`jailed_until == 0`).
    pub fn slash_double_sign(
        &mut self,
        staking: &mut StakingManager,
        evidence: &DoubleSignEvidence,
        now: Timestamp,
    ) -> Result<SlashEvent, SlashError> {
        self.validate_evidence(evidence)?;
        let power = staking.voting_power_of(&evidence.validator);
        if power == Amount::from(0u32) {
            return Err(SlashError::ValidatorNotFound);
        }
        if staking.is_jailed(&evidence.validator) {
            return Err(SlashError::AlreadyJailed);
        }
        let raw = power.clone() * Amount::from(self.config.double_sign_slash_bps) / Amount::from(BPS_DENOMINATOR);
        let amount = self.floor_and_cap(raw, &power);
        let _events = staking.apply_slash(
            evidence.validator,
            amount.clone(),
            SlashKind::DoubleSign,
            "double-signed two distinct blocks at the same height",
            evidence.height,
            now,
        );
        staking.set_jail(evidence.validator, true, 0);

        warn!("validator {:?} permanently jailed for double-signing at height {}", evidence.validator, evidence.height);
        Ok(SlashEvent::DoubleSignSlashed { validator: evidence.validator, amount })
    }

    /// Lifts a jail once its timer has elapsed. Permanent jails
    /// (`jailed_until == 0`) can never be lifted through this path.
    pub fn unjail(&mut self, staking: &mut StakingManager, validator: Address, now: Timestamp) -> Result<SlashEvent, SlashError> {
        if !staking.is_jailed(&validator) {
            return Err(SlashError::NotJailed);
        }
        let until = staking.jailed_until(&validator).ok_or(SlashError::ValidatorNotFound)?;
        if until == 0 {
            return Err(SlashError::PermanentlyJailed);
        }
        if now < until {
            return Err(SlashError::StillJailed);
        }
        staking.set_jail(validator, false, 0);
        Ok(SlashEvent::Unjailed { validator })
    }
}
