//! Entities shared by the validator set, staking manager, and slasher.
//!
//! These are the records the three components pass back and forth across
//! their protected interfaces; none of them owns a serialization format of
//! its own, since each crosses an API boundary only via the `api` module's
//! decimal-string views.

use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Amount, Timestamp};

/// Free-form validator description carried alongside the on-chain fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorMetadata {
    pub moniker: String,
    pub identity: Option<String>,
    pub website: Option<String>,
    pub details: Option<String>,
}

/// A validator as tracked by the staking manager and mirrored into the
/// validator set. `public_key` is the SEC1-encoded secp256k1 public key the
/// address was derived from, carried so signature verification never needs
/// a side lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub public_key: Vec<u8>,
    pub voting_power: Amount,
    pub commission_bps: u16,
    pub jailed: bool,
    /// Zero means permanently jailed; otherwise the unix timestamp jail
    /// auto-expires at.
    pub jailed_until: Timestamp,
    pub metadata: ValidatorMetadata,
}

impl Validator {
    pub fn is_permanently_jailed(&self) -> bool {
        self.jailed && self.jailed_until == 0
    }
}

/// A delegator's proportional claim on a validator's delegation pool.
/// `shares` tracks `amount` 1:1 under the reference's reward-crediting
/// design (see DESIGN.md) but is kept as a distinct field so a future
/// pool-accrual scheme only has to touch the issuance/removal arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub validator: Address,
    pub amount: Amount,
    pub shares: Amount,
}

/// A withdrawal in flight, released once `completion_time` has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    pub delegator: Address,
    pub validator: Address,
    pub amount: Amount,
    pub completion_time: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlashKind {
    DoubleSign,
    Downtime,
}

/// Append-only slashing history entry for a validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashRecord {
    pub height: u64,
    pub kind: SlashKind,
    pub amount: Amount,
    pub reason: String,
    pub timestamp: Timestamp,
}
