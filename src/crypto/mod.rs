//! Cryptographic primitives for the PIXELZX PoS node.
//!
//! Validator and delegator identities are secp256k1 key pairs, addressed the
//! Ethereum way so the consensus core stays compatible with the EVM
//! execution layer it sits in front of.

pub mod keys;

pub use keys::{address_from_verifying_key, verifying_key_from_bytes, KeyError, KeyPair, RecoverableSignature};
