//! Opaque transaction envelope.
//!
//! The node's consensus core never decodes a transaction's payload — that
//! is the job of the external EVM executor (`external::EvmExecutor`). All
//! the engine, the pool, and the block body need is a stable hash to key
//! on and the raw bytes to hand off at execution time.

use serde::{Deserialize, Serialize};

use crate::primitives::{keccak256, Hash};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    /// Opaque RLP/EVM-encoded payload; never inspected by the consensus core.
    pub raw: Vec<u8>,
}

impl Transaction {
    pub fn new(raw: Vec<u8>) -> Self {
        Transaction { raw }
    }

    pub fn hash(&self) -> Hash {
        keccak256(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_payload_dependent() {
        let a = Transaction::new(vec![1, 2, 3]);
        let b = Transaction::new(vec![1, 2, 3]);
        let c = Transaction::new(vec![1, 2, 4]);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }
}
