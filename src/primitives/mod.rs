//! Shared primitive types for the PIXELZX PoS node
//!
//! This module collects the fixed-size identifiers and arbitrary-precision
//! amount type used across the consensus, staking and slashing core so that
//! every component agrees on byte layout, ordering and serialisation.

use num_bigint::BigUint;
use num_traits::Zero;
use sha3::{Digest, Keccak256};

pub use primitive_types::{H160, H256};

/// 20-byte account/validator identifier, derived from a public key.
pub type Address = H160;

/// 32-byte digest, used for block hashes and validator-set hashes.
pub type Hash = H256;

/// Arbitrary-precision non-negative integer used for every stake, voting
/// power, share and reward quantity. Genesis allocations and rewards are
/// wei-denominated and can exceed a machine word.
pub type Amount = BigUint;

/// Unix timestamp in seconds. `0` denotes "unset"/"permanent" where the
/// context calls for a sentinel (e.g. permanent jail).
pub type Timestamp = i64;

/// Basis points denominator used throughout for commission and slash rates.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// keccak256 over arbitrary bytes, used for the validator-set hash and the
/// block-signing hash. The reference Go node uses `go-ethereum/crypto.Keccak256Hash`
/// for the same purposes; this is the Rust-crate equivalent.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    Hash::from_slice(&digest)
}

/// Zero hash, used as the canonical hash of an empty validator set.
pub fn zero_hash() -> Hash {
    Hash::zero()
}

/// Returns true if `amount` is zero.
pub fn is_zero(amount: &Amount) -> bool {
    amount.is_zero()
}

/// Big-endian fixed-width encoding of an [`Amount`], used by the canonical
/// validator-set hash so that voting power contributes a deterministic byte
/// length regardless of magnitude. 32 bytes comfortably covers wei-scale
/// genesis allocations without truncation.
pub fn amount_to_be_bytes(amount: &Amount) -> [u8; 32] {
    let be = amount.to_bytes_be();
    let mut buf = [0u8; 32];
    if be.len() <= 32 {
        buf[32 - be.len()..].copy_from_slice(&be);
    } else {
        // Magnitude exceeds 32 bytes; keep the low-order 32 bytes. This
        // cannot happen for any quantity this node accepts at genesis or
        // through staking, since supplies are bounded well under 2^256.
        buf.copy_from_slice(&be[be.len() - 32..]);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_hashes_to_zero() {
        assert_eq!(keccak256(&[]).is_zero(), false);
        assert_eq!(zero_hash(), Hash::zero());
    }

    #[test]
    fn amount_round_trips_through_be_bytes() {
        let amount = Amount::from(123_456_789u64);
        let bytes = amount_to_be_bytes(&amount);
        let recovered = Amount::from_bytes_be(&bytes);
        assert_eq!(amount, recovered);
    }
}
