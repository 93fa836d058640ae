//! Chain-level error types

use crate::hash::Hash;
use crate::shard::ShardId;
use thiserror::Error;

/// Structural block defects
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Chain has no blocks")]
    EmptyChain,

    #[error("Index mismatch: expected {expected}, got {found}")]
    IndexMismatch { expected: u64, found: u64 },

    #[error("Previous hash mismatch: tail is {expected}, block references {found}")]
    PreviousHashMismatch { expected: Hash, found: Hash },

    #[error("Block hash mismatch: claimed {claimed}, computed {computed}")]
    HashMismatch { claimed: Hash, computed: Hash },

    #[error("Block hash {hash} does not have {difficulty} leading zero digits")]
    InsufficientDifficulty { hash: Hash, difficulty: u32 },

    #[error("Merkle root mismatch: claimed {claimed}, computed {computed}")]
    MerkleRootMismatch { claimed: Hash, computed: Hash },

    #[error("Block {0} has not been confirmed by consensus")]
    NotConfirmed(Hash),
}

/// Transaction pool conditions; callers usually treat these as no-ops
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Transaction {0} is already pending")]
    Duplicate(Hash),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShardError {
    #[error("Unknown shard {0}")]
    UnknownShard(ShardId),

    #[error("Shard {0} already exists")]
    ShardExists(ShardId),

    #[error("Duplicate validator {0}")]
    DuplicateValidator(String),
}

/// Persistence failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Corrupt chain: {0}")]
    CorruptChain(String),
}
