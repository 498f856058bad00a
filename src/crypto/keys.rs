//! Ethereum-style secp256k1 key management and signing.
//!
//! Addresses are derived the same way `go-ethereum` derives them — the low
//! 20 bytes of `keccak256` over the uncompressed public key (minus its
//! leading `0x04` tag) — so validator and proposer addresses line up with
//! the EVM accounts the node's execution layer (external, see `external::evm`)
//! would otherwise produce.

use std::fmt;

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::primitives::{keccak256, Address};

/// A validator's or delegator's secp256k1 key pair.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        KeyPair { signing_key: SigningKey::random(&mut OsRng) }
    }

    /// Restore a key pair from a 32-byte secret.
    pub fn from_bytes(secret: &[u8]) -> Result<Self, KeyError> {
        let signing_key = SigningKey::from_slice(secret).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(KeyPair { signing_key })
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    pub fn address(&self) -> Address {
        address_from_verifying_key(&self.verifying_key())
    }

    /// Sign a 32-byte prehash (the consensus engine always signs a
    /// `keccak256` digest, never a raw message), returning a signature that
    /// recovers to this key's address.
    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> RecoverableSignature {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(prehash)
            .expect("signing a 32-byte digest never fails");
        RecoverableSignature { signature, recovery_id }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("address", &self.address()).finish()
    }
}

/// A signature plus the recovery id needed to recover the signer's public
/// key without already knowing it.
#[derive(Debug, Clone, Copy)]
pub struct RecoverableSignature {
    signature: Signature,
    recovery_id: RecoveryId,
}

impl RecoverableSignature {
    pub fn to_bytes(self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&self.signature.to_bytes());
        out[64] = self.recovery_id.to_byte();
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != 65 {
            return Err(KeyError::InvalidSignature);
        }
        let signature = Signature::from_slice(&bytes[..64]).map_err(|_| KeyError::InvalidSignature)?;
        let recovery_id = RecoveryId::from_byte(bytes[64]).ok_or(KeyError::InvalidSignature)?;
        Ok(RecoverableSignature { signature, recovery_id })
    }

    /// Recover the signer's address from a prehash and this signature.
    pub fn recover_address(&self, prehash: &[u8; 32]) -> Result<Address, KeyError> {
        let verifying_key = VerifyingKey::recover_from_prehash(prehash, &self.signature, self.recovery_id)
            .map_err(|_| KeyError::RecoveryFailed)?;
        Ok(address_from_verifying_key(&verifying_key))
    }

    /// Verify this signature against a known public key, without recovery.
    pub fn verify(&self, prehash: &[u8; 32], verifying_key: &VerifyingKey) -> bool {
        verifying_key.verify_prehash(prehash, &self.signature).is_ok()
    }
}

/// Derive the Ethereum-style address for a public key.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let bytes = encoded.as_bytes();
    // bytes[0] is the uncompressed-point tag (0x04); the address is the low
    // 20 bytes of keccak256 over the remaining 64-byte (X, Y) pair.
    let hash = keccak256(&bytes[1..]);
    Address::from_slice(&hash.as_bytes()[12..])
}

/// Decode a SEC1-encoded public key (as carried on `Validator::public_key`)
/// back into a `VerifyingKey` for signature verification.
pub fn verifying_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey, KeyError> {
    VerifyingKey::from_sec1_bytes(bytes).map_err(|_| KeyError::InvalidPublicKey)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    InvalidSecretKey,
    InvalidPublicKey,
    InvalidSignature,
    RecoveryFailed,
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::InvalidSecretKey => write!(f, "invalid secret key"),
            KeyError::InvalidPublicKey => write!(f, "invalid public key"),
            KeyError::InvalidSignature => write!(f, "invalid signature encoding"),
            KeyError::RecoveryFailed => write!(f, "signature did not recover to a valid public key"),
        }
    }
}

impl std::error::Error for KeyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_recover_round_trip() {
        let key = KeyPair::generate();
        let prehash = keccak256(b"hello pixelzx");
        let sig = key.sign_prehash(prehash.as_fixed_bytes());
        let recovered = sig.recover_address(prehash.as_fixed_bytes()).unwrap();
        assert_eq!(recovered, key.address());
    }

    #[test]
    fn recovery_rejects_wrong_signer() {
        let key1 = KeyPair::generate();
        let key2 = KeyPair::generate();
        let prehash = keccak256(b"hello pixelzx");
        let sig = key1.sign_prehash(prehash.as_fixed_bytes());
        let recovered = sig.recover_address(prehash.as_fixed_bytes()).unwrap();
        assert_ne!(recovered, key2.address());
    }

    #[test]
    fn signature_bytes_round_trip() {
        let key = KeyPair::generate();
        let prehash = keccak256(b"round trip");
        let sig = key.sign_prehash(prehash.as_fixed_bytes());
        let bytes = sig.to_bytes();
        let restored = RecoverableSignature::from_bytes(&bytes).unwrap();
        assert_eq!(restored.recover_address(prehash.as_fixed_bytes()).unwrap(), key.address());
    }
}
