//! Contracts for the collaborators the consensus engine depends on but does
//! not implement itself: a transaction pool, an EVM executor, a state
//! store, and a keystore. The core only needs these as interfaces — a real
//! node would back them with a mempool, a geth-style EVM, and a trie-backed
//! state database, none of which are this crate's concern.

use async_trait::async_trait;

use crate::blockchain::Transaction;
use crate::blockchain::block::Header;
use crate::primitives::Hash;

#[async_trait]
pub trait TransactionPool: Send + Sync {
    async fn pending(&self) -> Vec<Transaction>;
    async fn remove(&self, txs: &[Transaction]);
}

/// Result of executing a block's transactions against the state store.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub state_root: Hash,
    pub receipt_root: Hash,
    pub gas_used: u64,
    pub failed_indices: Vec<usize>,
}

#[async_trait]
pub trait EvmExecutor: Send + Sync {
    async fn execute(&self, txs: &[Transaction], header: &Header) -> ExecutionOutcome;
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn snapshot(&self) -> Hash;
    async fn revert(&self, to: Hash);
}

pub trait Keystore: Send + Sync {
    fn validator_key(&self) -> Option<crate::crypto::KeyPair>;
}

/// Reference keystore that simply holds a key in memory — no on-disk
/// encryption, same as the reference binary's keystore directory being
/// present but unopened by the core.
pub struct InMemoryKeystore {
    key: Option<crate::crypto::KeyPair>,
}

impl InMemoryKeystore {
    pub fn new(key: Option<crate::crypto::KeyPair>) -> Self {
        InMemoryKeystore { key }
    }

    pub fn empty() -> Self {
        InMemoryKeystore { key: None }
    }
}

impl Keystore for InMemoryKeystore {
    fn validator_key(&self) -> Option<crate::crypto::KeyPair> {
        self.key.clone()
    }
}

/// A transaction pool with nothing pending, used when a node runs without a
/// live mempool wired in (e.g. a read-only status node).
pub struct NullTransactionPool;

#[async_trait]
impl TransactionPool for NullTransactionPool {
    async fn pending(&self) -> Vec<Transaction> {
        Vec::new()
    }

    async fn remove(&self, _txs: &[Transaction]) {}
}

/// An executor that produces an empty-state outcome, used the same way.
pub struct NullEvmExecutor;

#[async_trait]
impl EvmExecutor for NullEvmExecutor {
    async fn execute(&self, _txs: &[Transaction], _header: &Header) -> ExecutionOutcome {
        ExecutionOutcome { state_root: Hash::zero(), receipt_root: Hash::zero(), gas_used: 0, failed_indices: Vec::new() }
    }
}

pub struct NullStateStore;

#[async_trait]
impl StateStore for NullStateStore {
    async fn snapshot(&self) -> Hash {
        Hash::zero()
    }

    async fn revert(&self, _to: Hash) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_pool_has_nothing_pending() {
        let pool = NullTransactionPool;
        assert!(pool.pending().await.is_empty());
    }

    #[test]
    fn empty_keystore_has_no_key() {
        let ks = InMemoryKeystore::empty();
        assert!(ks.validator_key().is_none());
    }
}
