//! Block header and body types, with the canonical byte encoding the
//! consensus engine signs and validators verify over.
//!
//! Hashing is `keccak256` over a fixed-order, length-prefixed byte
//! concatenation rather than a derived serde format, so the signing hash
//! never silently changes shape when a field is added elsewhere.

use serde::{Deserialize, Serialize};

use crate::blockchain::transaction::Transaction;
use crate::crypto::RecoverableSignature;
use crate::primitives::{amount_to_be_bytes, keccak256, Address, Amount, Hash, Timestamp};
use crate::types::Validator;

/// Block header. `signature` is produced over `signing_hash()`, which
/// excludes the signature itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub parent_hash: Hash,
    pub number: u64,
    pub timestamp: Timestamp,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub state_root: Hash,
    pub tx_root: Hash,
    pub receipt_root: Hash,
    pub validator_set_hash: Hash,
    pub proposer: Address,
    #[serde(with = "sig_bytes")]
    pub signature: Option<RecoverableSignature>,
    pub extra: Vec<u8>,
}

mod sig_bytes {
    use super::RecoverableSignature;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<RecoverableSignature>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|sig| sig.to_bytes()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RecoverableSignature>, D::Error> {
        use serde::de::Error;
        let raw: Option<[u8; 65]> = Option::deserialize(d)?;
        raw.map(|bytes| RecoverableSignature::from_bytes(&bytes)).transpose().map_err(D::Error::custom)
    }
}

impl Header {
    /// Deterministic byte encoding used both as the hash preimage and as the
    /// prehash the proposer signs. Everything is fixed-width or
    /// length-prefixed so no two distinct headers ever encode the same way.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.parent_hash.as_bytes());
        buf.extend_from_slice(&self.number.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.gas_limit.to_be_bytes());
        buf.extend_from_slice(&self.gas_used.to_be_bytes());
        buf.extend_from_slice(self.state_root.as_bytes());
        buf.extend_from_slice(self.tx_root.as_bytes());
        buf.extend_from_slice(self.receipt_root.as_bytes());
        buf.extend_from_slice(self.validator_set_hash.as_bytes());
        buf.extend_from_slice(self.proposer.as_bytes());
        buf.extend_from_slice(&(self.extra.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.extra);
        buf
    }

    pub fn signing_hash(&self) -> Hash {
        keccak256(&self.signing_bytes())
    }

    /// The header's identity hash. Equal to `signing_hash` since the
    /// signature itself is never part of the preimage a later block's
    /// `parent_hash` points at.
    pub fn hash(&self) -> Hash {
        self.signing_hash()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    /// The active validator set at the time this block was proposed,
    /// carried alongside the header's `validator_set_hash` so a peer that
    /// has never seen this epoch's roster can still verify `hash()` against
    /// it without a separate round trip.
    pub validator_list: Vec<Validator>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<Transaction>, validator_list: Vec<Validator>) -> Self {
        Block { header, transactions, validator_list }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// `keccak256` over the concatenation of each transaction's hash, in
    /// order. An empty block's tx root is `keccak256(&[])` — verification
    /// here only needs a root that changes if the transaction list changes,
    /// not Merkle proof membership.
    pub fn compute_tx_root(transactions: &[Transaction]) -> Hash {
        let mut buf = Vec::new();
        for tx in transactions {
            buf.extend_from_slice(tx.hash().as_bytes());
        }
        keccak256(&buf)
    }

    pub fn verify_tx_root(&self) -> bool {
        Self::compute_tx_root(&self.transactions) == self.header.tx_root
    }
}

/// Canonical encoding helper other modules (the validator-set hash, the
/// genesis loader) reuse to keep amount encoding consistent with the
/// header's fixed-width fields.
pub fn encode_amount(amount: &Amount) -> [u8; 32] {
    amount_to_be_bytes(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn sample_header(number: u64) -> Header {
        Header {
            parent_hash: Hash::zero(),
            number,
            timestamp: 1_700_000_000,
            gas_limit: 30_000_000,
            gas_used: 0,
            state_root: Hash::zero(),
            tx_root: Block::compute_tx_root(&[]),
            receipt_root: Hash::zero(),
            validator_set_hash: Hash::zero(),
            proposer: Address::zero(),
            signature: None,
            extra: Vec::new(),
        }
    }

    #[test]
    fn signing_hash_changes_with_any_field() {
        let a = sample_header(1);
        let mut b = sample_header(1);
        b.gas_used = 21_000;
        assert_ne!(a.signing_hash(), b.signing_hash());
    }

    #[test]
    fn signature_round_trips_through_header_serialization() {
        let key = KeyPair::generate();
        let mut header = sample_header(1);
        let sig = key.sign_prehash(header.signing_hash().as_fixed_bytes());
        header.signature = Some(sig);

        let encoded = bincode::serialize(&header).unwrap();
        let decoded: Header = bincode::deserialize(&encoded).unwrap();
        let recovered = decoded.signature.unwrap().recover_address(decoded.signing_hash().as_fixed_bytes()).unwrap();
        assert_eq!(recovered, key.address());
    }

    #[test]
    fn empty_block_tx_root_matches_header() {
        let header = sample_header(1);
        let block = Block::new(header, Vec::new(), Vec::new());
        assert!(block.verify_tx_root());
    }
}
