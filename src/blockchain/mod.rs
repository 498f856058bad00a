//! Block, header and transaction types shared by the consensus engine, the
//! wire protocol, and the external execution interface.

pub mod block;
pub mod transaction;

pub use block::{Block, Header};
pub use transaction::Transaction;
