use alsania_chain::{Hash, ShardError, StoreError, ValidationError};
use alsania_consensus::ConsensusError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Genesis block already exists")]
    GenesisExists,

    #[error("Stored genesis {stored} does not match configured genesis {configured}")]
    GenesisMismatch { stored: Hash, configured: Hash },

    #[error("Invalid block: {0}")]
    Validation(#[from] ValidationError),

    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("Shard error: {0}")]
    Shard(#[from] ShardError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Undecodable block: {0}")]
    Decode(String),

    #[error("Inbound message channel closed")]
    InboundClosed,

    #[error("This node has no local validator to propose as")]
    NotAValidator,
}
