//! Round-robin proof-of-stake consensus: proposer rotation, block signing
//! and validation, and epoch transitions.

pub mod engine;

pub use engine::{ConsensusConfig, ConsensusEngine, ConsensusError, ConsensusEvent, EngineState};
