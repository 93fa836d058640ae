//! Alsania Chain - ledger primitives
//!
//! This crate holds everything the consensus engine and the ledger share:
//! - Transactions and their content hashes
//! - Merkle roots and sealed, frozen blocks
//! - The append-only validator set
//! - The concurrent transaction pool and the shard router feeding it
//! - sled-backed chain persistence

pub mod block;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod persistence;
pub mod pool;
pub mod shard;
pub mod transaction;
pub mod validator;

pub use block::{hash_block, meets_difficulty, new_block, Block};
pub use error::{PoolError, ShardError, StoreError, ValidationError};
pub use hash::Hash;
pub use merkle::{compute_merkle_root, EMPTY_MERKLE_ROOT};
pub use persistence::{ChainMetadata, ChainStore};
pub use pool::TransactionPool;
pub use shard::{ShardId, ShardRouter};
pub use transaction::{Address, Transaction};
pub use validator::{Validator, ValidatorSet};

/// Leading zero hex digits a block hash needs by default
pub const DEFAULT_DIFFICULTY: u32 = 1;

/// Highest difficulty a node accepts. Stake votes order the chain; the
/// prefix only marks a block as sealed.
pub const MAX_DIFFICULTY: u32 = 4;

/// Maximum transactions taken from the pool per proposal
pub const MAX_TXS_PER_BLOCK: usize = 256;

/// Wall-clock time in unix milliseconds
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
