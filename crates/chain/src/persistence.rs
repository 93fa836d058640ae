//! Persistence Layer for the Chain
//!
//! Uses sled embedded database to persist blocks across restarts.
//! Blocks are keyed by big-endian index so iteration yields chain order.

use crate::block::Block;
use crate::error::StoreError;
use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;

/// Metadata about the stored chain
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainMetadata {
    /// Number of blocks, genesis included
    pub height: u64,
    /// Hash of the last block
    pub tip_hash: Hash,
    /// Last save timestamp
    pub last_save_ts: i64,
}

/// Persistent storage for the chain
pub struct ChainStore {
    /// Sled database instance
    db: Db,
    /// Blocks tree
    blocks: sled::Tree,
    /// Metadata tree
    metadata: sled::Tree,
}

impl ChainStore {
    /// Open or create a chain store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(&path)?;
        let blocks = db.open_tree("blocks")?;
        let metadata = db.open_tree("metadata")?;

        tracing::info!("Opened chain store at {:?}", path.as_ref());

        Ok(Self { db, blocks, metadata })
    }

    /// Store a block under its index
    pub fn store_block(&self, block: &Block) -> Result<(), StoreError> {
        let bytes = bincode::serialize(block)?;
        self.blocks.insert(block.index().to_be_bytes(), bytes)?;
        Ok(())
    }

    /// Get a block by index
    pub fn get_block(&self, index: u64) -> Result<Option<Block>, StoreError> {
        match self.blocks.get(index.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load and verify the whole chain.
    ///
    /// Genesis must be present at index 0 with a zero previous hash, indices
    /// must be contiguous, and every later block must re-hash, match its
    /// merkle root, meet `difficulty` and link to its predecessor. Any defect
    /// is reported as [`StoreError::CorruptChain`].
    pub fn load_chain(&self, difficulty: u32) -> Result<Vec<Block>, StoreError> {
        let mut chain: Vec<Block> = Vec::new();

        for result in self.blocks.iter() {
            let (key, value) = result?;
            let block: Block = bincode::deserialize(&value)?;

            let key_index = <[u8; 8]>::try_from(key.as_ref())
                .map(u64::from_be_bytes)
                .map_err(|_| StoreError::CorruptChain("invalid block key length".to_string()))?;
            if key_index != block.index() {
                return Err(StoreError::CorruptChain(format!(
                    "block stored under key {} claims index {}",
                    key_index,
                    block.index()
                )));
            }

            match chain.last() {
                None => {
                    if !block.is_genesis() || *block.previous_hash() != Hash::ZERO {
                        return Err(StoreError::CorruptChain("genesis block missing".to_string()));
                    }
                    block
                        .check_integrity()
                        .map_err(|e| StoreError::CorruptChain(format!("genesis: {}", e)))?;
                }
                Some(tail) => {
                    block
                        .check_extends(tail, difficulty)
                        .map_err(|e| StoreError::CorruptChain(format!("block {}: {}", block.index(), e)))?;
                }
            }

            chain.push(block);
        }

        if let Some(tail) = chain.last() {
            tracing::info!("Loaded {} blocks from disk, tip {}", chain.len(), tail.hash().short());
        }

        Ok(chain)
    }

    /// Save chain metadata
    pub fn save_metadata(&self, metadata: &ChainMetadata) -> Result<(), StoreError> {
        let bytes = bincode::serialize(metadata)?;
        self.metadata.insert("chain", bytes)?;
        Ok(())
    }

    /// Load chain metadata
    pub fn load_metadata(&self) -> Result<Option<ChainMetadata>, StoreError> {
        match self.metadata.get("chain")? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of stored blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}
