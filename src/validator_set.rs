//! Validator set: the sorted, versioned view of active validators the
//! consensus engine drives proposer rotation and signature quorum from.
//!
//! The set owns its own copy of each `Validator` it tracks, separate from
//! the staking manager's authoritative record — callers (the node wiring,
//! the slasher) push updates in via `add`/`replace_all` as staking state
//! changes, and `update_for_new_epoch` is the only place jailed entries and
//! stale power actually get swept out. This mirrors the reference's
//! `ValidatorSet.AddValidator`/`UpdateForNewEpoch` split.

use std::collections::{HashMap, HashSet};
use std::fmt;

use num_traits::Zero;

use crate::crypto::RecoverableSignature;
use crate::primitives::{amount_to_be_bytes, keccak256, zero_hash, Address, Amount, Hash};
use crate::types::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorSetError {
    InsufficientVotingPower,
    InvalidSignature,
}

impl fmt::Display for ValidatorSetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorSetError::InsufficientVotingPower => write!(f, "insufficient voting power for quorum"),
            ValidatorSetError::InvalidSignature => write!(f, "signature did not recover to a valid signer"),
        }
    }
}

impl std::error::Error for ValidatorSetError {}

/// A point-in-time copy of the active set, used for restore and for
/// equality checks against a hash recorded elsewhere (e.g. a block header).
#[derive(Debug, Clone)]
pub struct ValidatorSetSnapshot {
    pub height: u64,
    pub validators: Vec<Validator>,
    pub hash: Hash,
}

pub struct ValidatorSet {
    max_validators: usize,
    validators: HashMap<Address, Validator>,
    /// Active (non-jailed), sorted descending by voting power, ascending by
    /// address on ties. The only source of determinism for proposer
    /// rotation and `hash()`.
    sorted: Vec<Address>,
    total_power: Amount,
}

impl ValidatorSet {
    pub fn new(max_validators: usize) -> Self {
        ValidatorSet {
            max_validators,
            validators: HashMap::new(),
            sorted: Vec::new(),
            total_power: Amount::zero(),
        }
    }

    /// Insert or overwrite the entry for `validator.address`, updating the
    /// running total and rebuilding the sorted view.
    pub fn add(&mut self, validator: Validator) {
        let addr = validator.address;
        if let Some(old) = self.validators.get(&addr) {
            self.total_power -= old.voting_power.clone();
        }
        self.total_power += validator.voting_power.clone();
        self.validators.insert(addr, validator);
        self.rebuild_sorted();
    }

    pub fn remove(&mut self, addr: &Address) {
        if let Some(old) = self.validators.remove(addr) {
            self.total_power -= old.voting_power;
            self.rebuild_sorted();
        }
    }

    /// Atomic reset to exactly `list`.
    pub fn replace_all(&mut self, list: Vec<Validator>) {
        self.validators.clear();
        self.total_power = Amount::zero();
        for v in list {
            self.total_power += v.voting_power.clone();
            self.validators.insert(v.address, v);
        }
        self.rebuild_sorted();
    }

    fn rebuild_sorted(&mut self) {
        let mut addrs: Vec<Address> = self
            .validators
            .values()
            .filter(|v| !v.jailed)
            .map(|v| v.address)
            .collect();
        addrs.sort_by(|a, b| {
            let va = &self.validators[a];
            let vb = &self.validators[b];
            vb.voting_power.cmp(&va.voting_power).then_with(|| a.cmp(b))
        });
        self.sorted = addrs;
    }

    /// `sorted[block_number mod len(sorted)]`, or `None` if the set is empty.
    pub fn get_proposer(&self, block_number: u64) -> Option<Validator> {
        if self.sorted.is_empty() {
            return None;
        }
        let idx = (block_number as usize) % self.sorted.len();
        self.validators.get(&self.sorted[idx]).cloned()
    }

    pub fn get_by_address(&self, addr: &Address) -> Option<Validator> {
        self.validators.get(addr).cloned()
    }

    pub fn total_voting_power(&self) -> Amount {
        self.total_power.clone()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// `keccak256(concat(addr ∥ pubkey ∥ voting_power_be_bytes for v in sorted))`.
    /// An empty active list hashes to the zero hash.
    pub fn hash(&self) -> Hash {
        if self.sorted.is_empty() {
            return zero_hash();
        }
        let mut buf = Vec::new();
        for addr in &self.sorted {
            let v = &self.validators[addr];
            buf.extend_from_slice(addr.as_bytes());
            buf.extend_from_slice(&v.public_key);
            buf.extend_from_slice(&amount_to_be_bytes(&v.voting_power));
        }
        keccak256(&buf)
    }

    /// Drops jailed entries, truncates the active list to `max_validators`,
    /// and reconciles the mapping and running total to match exactly.
    pub fn update_for_new_epoch(&mut self) {
        let keep: Vec<Address> = self.sorted.iter().take(self.max_validators).cloned().collect();
        let keep_set: HashSet<Address> = keep.iter().cloned().collect();
        self.validators.retain(|addr, _| keep_set.contains(addr));
        self.total_power = self
            .validators
            .values()
            .fold(Amount::zero(), |acc, v| acc + v.voting_power.clone());
        self.sorted = keep;
    }

    /// Sums the voting power of signatures that recover to their claimed
    /// address and belong to a known validator, requiring strictly more
    /// than two-thirds of `total_power` (`3 * collected > 2 * total_power`).
    pub fn validate_signatures(
        &self,
        sigs: &HashMap<Address, RecoverableSignature>,
        hash: Hash,
    ) -> Result<(), ValidatorSetError> {
        let mut collected = Amount::zero();
        for (addr, sig) in sigs {
            let Some(v) = self.validators.get(addr) else { continue };
            let recovered = sig
                .recover_address(hash.as_fixed_bytes())
                .map_err(|_| ValidatorSetError::InvalidSignature)?;
            if recovered == *addr {
                collected += v.voting_power.clone();
            }
        }
        if Amount::from(3u32) * &collected > Amount::from(2u32) * &self.total_power {
            Ok(())
        } else {
            Err(ValidatorSetError::InsufficientVotingPower)
        }
    }

    pub fn snapshot(&self, height: u64) -> ValidatorSetSnapshot {
        ValidatorSetSnapshot {
            height,
            validators: self.validators.values().cloned().collect(),
            hash: self.hash(),
        }
    }

    pub fn restore(&mut self, snapshot: &ValidatorSetSnapshot) {
        self.replace_all(snapshot.validators.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidatorMetadata;

    fn validator(byte: u8, power: u64) -> Validator {
        Validator {
            address: Address::from_low_u64_be(byte as u64),
            public_key: vec![byte],
            voting_power: Amount::from(power),
            commission_bps: 0,
            jailed: false,
            jailed_until: 0,
            metadata: ValidatorMetadata::default(),
        }
    }

    #[test]
    fn proposer_rotates_round_robin_over_equal_power() {
        let mut set = ValidatorSet::new(125);
        set.add(validator(1, 100));
        set.add(validator(2, 100));
        set.add(validator(3, 100));

        let a = set.get_proposer(0).unwrap().address;
        let b = set.get_proposer(1).unwrap().address;
        let c = set.get_proposer(2).unwrap().address;
        let wrap = set.get_proposer(3).unwrap().address;

        assert_eq!(a, Address::from_low_u64_be(1));
        assert_eq!(b, Address::from_low_u64_be(2));
        assert_eq!(c, Address::from_low_u64_be(3));
        assert_eq!(wrap, a);
    }

    #[test]
    fn empty_set_hashes_to_zero() {
        let set = ValidatorSet::new(125);
        assert_eq!(set.hash(), zero_hash());
    }

    #[test]
    fn jailed_validators_are_excluded_from_rotation() {
        let mut set = ValidatorSet::new(125);
        set.add(validator(1, 100));
        let mut jailed = validator(2, 200);
        jailed.jailed = true;
        set.add(jailed);

        assert_eq!(set.get_proposer(0).unwrap().address, Address::from_low_u64_be(1));
        assert_eq!(set.get_proposer(1).unwrap().address, Address::from_low_u64_be(1));
    }

    #[test]
    fn update_for_new_epoch_drops_jailed_and_truncates() {
        let mut set = ValidatorSet::new(1);
        set.add(validator(1, 200));
        let mut jailed = validator(2, 500);
        jailed.jailed = true;
        set.add(jailed);
        set.add(validator(3, 100));

        set.update_for_new_epoch();

        assert_eq!(set.len(), 1);
        assert_eq!(set.total_voting_power(), Amount::from(200u32));
        assert!(set.get_by_address(&Address::from_low_u64_be(2)).is_none());
        assert!(set.get_by_address(&Address::from_low_u64_be(3)).is_none());
    }

    #[test]
    fn quorum_requires_strictly_more_than_two_thirds() {
        let mut set = ValidatorSet::new(125);
        set.add(validator(1, 100));
        set.add(validator(2, 100));
        set.add(validator(3, 100));
        // total_power = 300; exactly 200 (2/3) must fail, 201 must pass.
        let hash = keccak256(b"block");

        let mut sigs_short = HashMap::new();
        let key1 = crate::crypto::KeyPair::generate();
        let key2 = crate::crypto::KeyPair::generate();
        let mut set2 = ValidatorSet::new(125);
        set2.add(Validator { address: key1.address(), ..validator(1, 100) });
        set2.add(Validator { address: key2.address(), ..validator(2, 100) });
        set2.add(validator(3, 100));

        sigs_short.insert(key1.address(), key1.sign_prehash(hash.as_fixed_bytes()));
        assert_eq!(
            set2.validate_signatures(&sigs_short, hash),
            Err(ValidatorSetError::InsufficientVotingPower)
        );

        let mut sigs_enough = sigs_short;
        sigs_enough.insert(key2.address(), key2.sign_prehash(hash.as_fixed_bytes()));
        assert!(set2.validate_signatures(&sigs_enough, hash).is_ok());
    }

    #[test]
    fn snapshot_restore_round_trips_the_hash() {
        let mut set = ValidatorSet::new(125);
        set.add(validator(1, 100));
        set.add(validator(2, 200));
        let snap = set.snapshot(10);
        let hash_before = set.hash();

        set.add(validator(3, 900));
        assert_ne!(set.hash(), hash_before);

        set.restore(&snap);
        assert_eq!(set.hash(), hash_before);
        assert_eq!(set.hash(), snap.hash);
    }
}
