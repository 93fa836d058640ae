//! Blocks
//!
//! A block's nonce, merkle root and hash are computed once when it is built
//! (or sealed against a difficulty target) and never change afterwards.

use crate::error::ValidationError;
use crate::hash::Hash;
use crate::merkle::compute_merkle_root;
use crate::transaction::Transaction;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// A frozen block.
///
/// Field order is the persisted order: index, timestamp, previous hash,
/// nonce, merkle root, transactions, hash.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    /// Unix millis
    timestamp: u64,
    previous_hash: Hash,
    nonce: u64,
    merkle_root: Hash,
    transactions: Vec<Transaction>,
    hash: Hash,
}

/// `H(index || timestamp || previous_hash || nonce || merkle_root)`, integers little-endian
fn header_hash(index: u64, timestamp: u64, previous_hash: &Hash, nonce: u64, merkle_root: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&index.to_le_bytes());
    hasher.update(&timestamp.to_le_bytes());
    hasher.update(previous_hash.as_bytes());
    hasher.update(&nonce.to_le_bytes());
    hasher.update(merkle_root.as_bytes());
    Hash(*hasher.finalize().as_bytes())
}

/// Recompute a block's hash from its header fields
pub fn hash_block(block: &Block) -> Hash {
    header_hash(
        block.index,
        block.timestamp,
        &block.previous_hash,
        block.nonce,
        &block.merkle_root,
    )
}

/// Whether `hash` carries `difficulty` leading zero hex digits
pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    hash.leading_zero_nibbles() >= difficulty
}

/// Build a frozen block stamped with the current wall-clock time
pub fn new_block(index: u64, transactions: Vec<Transaction>, previous_hash: Hash) -> Block {
    Block::new(index, transactions, previous_hash, crate::now_millis())
}

impl Block {
    /// Build a frozen block with nonce 0
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: Hash, timestamp: u64) -> Self {
        let merkle_root = compute_merkle_root(&transactions);
        let hash = header_hash(index, timestamp, &previous_hash, 0, &merkle_root);
        Self {
            index,
            timestamp,
            previous_hash,
            nonce: 0,
            merkle_root,
            transactions,
            hash,
        }
    }

    /// Build a block and search nonces until its hash meets `difficulty`.
    ///
    /// Each extra digit multiplies the expected work by 16, so the target is
    /// capped at [`MAX_DIFFICULTY`](crate::MAX_DIFFICULTY).
    pub fn seal(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: Hash,
        timestamp: u64,
        difficulty: u32,
    ) -> Self {
        let difficulty = difficulty.min(crate::MAX_DIFFICULTY);
        let merkle_root = compute_merkle_root(&transactions);
        let mut nonce = 0u64;
        let hash = loop {
            let candidate = header_hash(index, timestamp, &previous_hash, nonce, &merkle_root);
            if meets_difficulty(&candidate, difficulty) {
                break candidate;
            }
            nonce = nonce.wrapping_add(1);
        };

        Self {
            index,
            timestamp,
            previous_hash,
            nonce,
            merkle_root,
            transactions,
            hash,
        }
    }

    /// Block 0: no transactions, zero previous hash
    pub fn genesis(timestamp: u64) -> Self {
        Self::new(0, Vec::new(), Hash::ZERO, timestamp)
    }

    /// Reassemble a block received from a peer or loaded from disk.
    ///
    /// The claimed `merkle_root` and `hash` are kept as-is; use
    /// [`Block::check_integrity`] or [`Block::check_extends`] before trusting them.
    pub fn from_parts(
        index: u64,
        timestamp: u64,
        previous_hash: Hash,
        nonce: u64,
        merkle_root: Hash,
        transactions: Vec<Transaction>,
        hash: Hash,
    ) -> Self {
        Self {
            index,
            timestamp,
            previous_hash,
            nonce,
            merkle_root,
            transactions,
            hash,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn previous_hash(&self) -> &Hash {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn merkle_root(&self) -> &Hash {
        &self.merkle_root
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Claimed hash and merkle root both match a fresh recomputation
    pub fn check_integrity(&self) -> Result<(), ValidationError> {
        let computed = hash_block(self);
        if computed != self.hash {
            return Err(ValidationError::HashMismatch {
                claimed: self.hash,
                computed,
            });
        }

        let computed = compute_merkle_root(&self.transactions);
        if computed != self.merkle_root {
            return Err(ValidationError::MerkleRootMismatch {
                claimed: self.merkle_root,
                computed,
            });
        }

        Ok(())
    }

    /// Structural check that this block may follow `tail`
    pub fn check_extends(&self, tail: &Block, difficulty: u32) -> Result<(), ValidationError> {
        if self.index != tail.index + 1 {
            return Err(ValidationError::IndexMismatch {
                expected: tail.index + 1,
                found: self.index,
            });
        }

        if self.previous_hash != tail.hash {
            return Err(ValidationError::PreviousHashMismatch {
                expected: tail.hash,
                found: self.previous_hash,
            });
        }

        if !meets_difficulty(&self.hash, difficulty) {
            return Err(ValidationError::InsufficientDifficulty {
                hash: self.hash,
                difficulty,
            });
        }

        self.check_integrity()
    }

    /// Serialize for network transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("Block serialization should not fail")
    }

    /// Deserialize from network
    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}
