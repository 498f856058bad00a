//! Genesis file loading.
//!
//! `genesis.json` seeds the chain id, the initial validator roster, and the
//! PoS parameters the staking manager and slasher start from. It is read
//! once at startup, the same way the reference binary loads its own
//! on-disk JSON state.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Amount};
use crate::slashing::SlasherConfig;
use crate::staking::StakingConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosConfig {
    pub period: u64,
    pub epoch: u64,
    #[serde(rename = "minValidatorStake")]
    pub min_validator_stake: String,
    #[serde(rename = "minDelegatorStake")]
    pub min_delegator_stake: String,
    #[serde(rename = "maxValidators")]
    pub max_validators: u64,
    #[serde(rename = "unbondingPeriod")]
    pub unbonding_period: u64,
    #[serde(rename = "slashingPenalty")]
    pub slashing_penalty: String,
    #[serde(rename = "blockReward", default = "default_block_reward")]
    pub block_reward: String,
}

fn default_block_reward() -> String {
    "0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    pub pos: PosConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocEntry {
    pub balance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub address: String,
    pub pubkey: String,
    pub power: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    pub timestamp: i64,
    pub difficulty: String,
    #[serde(rename = "gasLimit")]
    pub gas_limit: String,
    pub alloc: std::collections::HashMap<String, AllocEntry>,
    pub config: ChainConfig,
    #[serde(rename = "extraData")]
    pub extra_data: String,
    pub validators: Vec<GenesisValidator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenesisError {
    Io(String),
    Parse(String),
    InvalidAmount(String),
    InvalidAddress(String),
}

impl fmt::Display for GenesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenesisError::Io(msg) => write!(f, "failed to read genesis file: {msg}"),
            GenesisError::Parse(msg) => write!(f, "failed to parse genesis file: {msg}"),
            GenesisError::InvalidAmount(msg) => write!(f, "invalid decimal amount in genesis file: {msg}"),
            GenesisError::InvalidAddress(msg) => write!(f, "invalid address in genesis file: {msg}"),
        }
    }
}

impl std::error::Error for GenesisError {}

impl Genesis {
    pub fn load(path: &Path) -> Result<Self, GenesisError> {
        let contents = fs::read_to_string(path).map_err(|e| GenesisError::Io(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| GenesisError::Parse(e.to_string()))
    }

    pub fn staking_config(&self) -> Result<StakingConfig, GenesisError> {
        Ok(StakingConfig {
            min_validator_stake: parse_amount(&self.config.pos.min_validator_stake)?,
            min_delegator_stake: parse_amount(&self.config.pos.min_delegator_stake)?,
            max_validators: self.config.pos.max_validators as usize,
            unbonding_period_seconds: self.config.pos.unbonding_period as i64,
            block_reward: parse_amount(&self.config.pos.block_reward)?,
            inflation_rate_bps: 0,
            default_commission_rate_bps: 0,
        })
    }

    /// Derives downtime/double-sign slash rates from `slashingPenalty`
    /// (a fraction scaled `1e18`, per §6) by reading it as basis points of
    /// that scale — the genesis format carries one shared penalty fraction,
    /// applied identically to both slash kinds at node start. The same raw
    /// `slashingPenalty` amount also seeds `min_slash_amount`, so a validator
    /// can never be punished for less than one unit of the genesis penalty.
    pub fn slasher_config(&self) -> Result<SlasherConfig, GenesisError> {
        let penalty = parse_amount(&self.config.pos.slashing_penalty)?;
        let scale = BigUint::from(10u64).pow(18);
        let bps = (penalty.clone() * BigUint::from(10_000u32) / scale).to_string().parse::<u16>().unwrap_or(0);
        Ok(SlasherConfig {
            downtime_slash_bps: bps,
            double_sign_slash_bps: bps.saturating_mul(5),
            downtime_jail_seconds: 24 * 3600,
            missed_block_threshold: 50,
            signing_window: self.config.pos.epoch.max(1) * 10,
            min_slash_amount: penalty,
        })
    }

    pub fn validators(&self) -> Result<Vec<(Address, Vec<u8>, Amount)>, GenesisError> {
        self.validators
            .iter()
            .map(|v| {
                let address = parse_address(&v.address)?;
                let pubkey = hex::decode(v.pubkey.trim_start_matches("0x"))
                    .map_err(|e| GenesisError::InvalidAddress(e.to_string()))?;
                let power = parse_amount(&v.power)?;
                Ok((address, pubkey, power))
            })
            .collect()
    }
}

fn parse_amount(value: &str) -> Result<Amount, GenesisError> {
    BigUint::from_str(value).map_err(|e| GenesisError::InvalidAmount(format!("{value}: {e}")))
}

fn parse_address(value: &str) -> Result<Address, GenesisError> {
    let trimmed = value.trim_start_matches("0x");
    let bytes = hex::decode(trimmed).map_err(|e| GenesisError::InvalidAddress(e.to_string()))?;
    if bytes.len() != 20 {
        return Err(GenesisError::InvalidAddress(format!("expected 20 bytes, got {}", bytes.len())));
    }
    Ok(Address::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "chainId": 1337,
            "timestamp": 1700000000,
            "difficulty": "0x1",
            "gasLimit": "0x1c9c380",
            "alloc": {},
            "config": {
                "chainId": 1337,
                "pos": {
                    "period": 5,
                    "epoch": 100,
                    "minValidatorStake": "1000000000000000000",
                    "minDelegatorStake": "1000000000000000",
                    "maxValidators": 125,
                    "unbondingPeriod": 1814400,
                    "slashingPenalty": "10000000000000000"
                }
            },
            "extraData": "pixelzx",
            "validators": [
                {"address": "0x0000000000000000000000000000000000000001", "pubkey": "0x02", "power": "1000000000000000000"}
            ]
        }"#
    }

    #[test]
    fn parses_staking_config_from_pos_section() {
        let genesis: Genesis = serde_json::from_str(sample_json()).unwrap();
        let staking = genesis.staking_config().unwrap();
        assert_eq!(staking.max_validators, 125);
        assert_eq!(staking.unbonding_period_seconds, 1_814_400);
        // blockReward is absent from sample_json, so it falls back to zero.
        assert_eq!(staking.block_reward, Amount::zero());
    }

    #[test]
    fn slasher_config_floors_slashes_at_the_slashing_penalty() {
        let genesis: Genesis = serde_json::from_str(sample_json()).unwrap();
        let slasher = genesis.slasher_config().unwrap();
        assert_eq!(slasher.min_slash_amount, Amount::from(10_000_000_000_000_000u64));
    }

    #[test]
    fn parses_validator_roster() {
        let genesis: Genesis = serde_json::from_str(sample_json()).unwrap();
        let validators = genesis.validators().unwrap();
        assert_eq!(validators.len(), 1);
        assert_eq!(validators[0].2, Amount::from(1_000_000_000_000_000_000u64));
    }
}
