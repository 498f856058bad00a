//! Wire message shapes exchanged with peers.
//!
//! Only the message types crossing the network boundary are modeled here —
//! the transport itself (socket framing, peer discovery) is out of scope;
//! callers encode/decode a `WireMessage` and hand the bytes to whatever
//! transport they use.

use serde::{Deserialize, Serialize};

use crate::blockchain::{Block, Transaction};
use crate::primitives::Hash;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub version: u32,
    pub network_id: u64,
    pub genesis_hash: Hash,
    pub head_hash: Hash,
    pub height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBlocks {
    pub from: u64,
    pub to: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireMessage {
    Handshake(Handshake),
    Block(Block),
    Transaction(Transaction),
    RequestBlocks(RequestBlocks),
    ResponseBlocks(Vec<Block>),
}

impl WireMessage {
    pub fn code(&self) -> u8 {
        match self {
            WireMessage::Handshake(_) => 0x00,
            WireMessage::Block(_) => 0x01,
            WireMessage::Transaction(_) => 0x02,
            WireMessage::RequestBlocks(_) => 0x03,
            WireMessage::ResponseBlocks(_) => 0x04,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    NetworkMismatch,
}

impl std::fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandshakeError::NetworkMismatch => write!(f, "peer's network_id does not match ours"),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// A peer's validated handshake state, recorded on success.
#[derive(Debug, Clone)]
pub struct PeerHead {
    pub head_hash: Hash,
    pub height: u64,
}

/// Rejects the peer if `network_id` mismatches; otherwise records the
/// peer's declared head and height.
pub fn validate_handshake(ours: &Handshake, theirs: &Handshake) -> Result<PeerHead, HandshakeError> {
    if ours.network_id != theirs.network_id {
        return Err(HandshakeError::NetworkMismatch);
    }
    Ok(PeerHead { head_hash: theirs.head_hash, height: theirs.height })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::keccak256;

    fn handshake(network_id: u64) -> Handshake {
        Handshake { version: 1, network_id, genesis_hash: keccak256(b"genesis"), head_hash: keccak256(b"head"), height: 10 }
    }

    #[test]
    fn handshake_rejects_network_mismatch() {
        let ours = handshake(1);
        let theirs = handshake(2);
        assert_eq!(validate_handshake(&ours, &theirs), Err(HandshakeError::NetworkMismatch));
    }

    #[test]
    fn handshake_records_peer_head_on_match() {
        let ours = handshake(1);
        let theirs = handshake(1);
        let head = validate_handshake(&ours, &theirs).unwrap();
        assert_eq!(head.height, 10);
    }

    #[test]
    fn message_round_trips_through_bincode() {
        let msg = WireMessage::Handshake(handshake(1));
        let bytes = msg.encode().unwrap();
        let decoded = WireMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.code(), 0x00);
    }
}
