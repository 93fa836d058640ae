//! Shard router
//!
//! Shards are routing partitions only: each one batches transactions until
//! the next proposal cycle moves them into the shared pool. Creating a shard
//! folds its validators into the global validator set.

use crate::error::ShardError;
use crate::pool::TransactionPool;
use crate::transaction::Transaction;
use crate::validator::{Validator, ValidatorSet};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ShardId = u32;

struct Shard {
    validators: Vec<Validator>,
    queue: Vec<Transaction>,
}

pub struct ShardRouter {
    /// Ordered so draining visits shards by ascending id
    shards: Mutex<BTreeMap<ShardId, Shard>>,
    validators: Arc<ValidatorSet>,
    pool: Arc<TransactionPool>,
}

impl ShardRouter {
    pub fn new(validators: Arc<ValidatorSet>, pool: Arc<TransactionPool>) -> Self {
        Self {
            shards: Mutex::new(BTreeMap::new()),
            validators,
            pool,
        }
    }

    /// Register a shard and admit its validators to the global set
    pub fn create_shard(&self, shard_id: ShardId, validators: Vec<Validator>) -> Result<(), ShardError> {
        let mut shards = self.shards.lock();
        if shards.contains_key(&shard_id) {
            return Err(ShardError::ShardExists(shard_id));
        }

        self.validators.add_all(validators.clone())?;

        tracing::info!(
            "Created shard {} with {} validators (total stake now {})",
            shard_id,
            validators.len(),
            self.validators.total_stake()
        );

        shards.insert(
            shard_id,
            Shard {
                validators,
                queue: Vec::new(),
            },
        );
        Ok(())
    }

    /// Queue a transaction on a shard
    pub fn route(&self, shard_id: ShardId, transaction: Transaction) -> Result<(), ShardError> {
        let mut shards = self.shards.lock();
        let shard = shards
            .get_mut(&shard_id)
            .ok_or(ShardError::UnknownShard(shard_id))?;
        shard.queue.push(transaction);
        Ok(())
    }

    /// Move every shard's queue into the pool. Returns how many transactions
    /// were newly admitted (duplicates of pending ones are dropped).
    pub fn drain_all_into_pool(&self) -> usize {
        let mut shards = self.shards.lock();
        let mut admitted = 0;
        let mut duplicates = 0;

        for shard in shards.values_mut() {
            for tx in shard.queue.drain(..) {
                if self.pool.add(tx) {
                    admitted += 1;
                } else {
                    duplicates += 1;
                }
            }
        }

        if admitted > 0 || duplicates > 0 {
            tracing::debug!(
                "Drained shards into pool: {} admitted, {} duplicates, pool size {}",
                admitted,
                duplicates,
                self.pool.len()
            );
        }

        admitted
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.shards.lock().keys().copied().collect()
    }

    /// Number of transactions waiting on a shard
    pub fn queued(&self, shard_id: ShardId) -> Result<usize, ShardError> {
        self.shards
            .lock()
            .get(&shard_id)
            .map(|s| s.queue.len())
            .ok_or(ShardError::UnknownShard(shard_id))
    }

    pub fn shard_validators(&self, shard_id: ShardId) -> Result<Vec<Validator>, ShardError> {
        self.shards
            .lock()
            .get(&shard_id)
            .map(|s| s.validators.clone())
            .ok_or(ShardError::UnknownShard(shard_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> (ShardRouter, Arc<ValidatorSet>, Arc<TransactionPool>) {
        let validators = Arc::new(ValidatorSet::new());
        let pool = Arc::new(TransactionPool::new());
        (ShardRouter::new(validators.clone(), pool.clone()), validators, pool)
    }

    #[test]
    fn test_create_shard_folds_validators() {
        let (router, validators, _) = router();
        router
            .create_shard(1, vec![Validator::new("v1", 10, [1; 32]), Validator::new("v2", 20, [2; 32])])
            .unwrap();
        router.create_shard(2, vec![Validator::new("v3", 5, [3; 32])]).unwrap();

        assert_eq!(validators.len(), 3);
        assert_eq!(validators.total_stake(), 35);
        assert_eq!(router.shard_ids(), vec![1, 2]);
        assert_eq!(router.shard_validators(2).unwrap()[0].id, "v3");
    }

    #[test]
    fn test_duplicate_validator_rejected() {
        let (router, validators, _) = router();
        router.create_shard(1, vec![Validator::new("v1", 10, [1; 32])]).unwrap();

        let err = router
            .create_shard(2, vec![Validator::new("v1", 10, [1; 32])])
            .unwrap_err();
        assert_eq!(err, ShardError::DuplicateValidator("v1".to_string()));
        assert_eq!(router.shard_ids(), vec![1]);
        assert_eq!(validators.len(), 1);

        assert_eq!(router.create_shard(1, Vec::new()), Err(ShardError::ShardExists(1)));
    }

    #[test]
    fn test_route_unknown_shard() {
        let (router, _, _) = router();
        let err = router.route(9, Transaction::new("a", "b", 1, 1)).unwrap_err();
        assert_eq!(err, ShardError::UnknownShard(9));
    }

    #[test]
    fn test_drain_moves_queues_into_pool() {
        let (router, _, pool) = router();
        router.create_shard(2, Vec::new()).unwrap();
        router.create_shard(1, Vec::new()).unwrap();

        router.route(2, Transaction::new("a", "b", 2, 1)).unwrap();
        router.route(1, Transaction::new("a", "b", 1, 1)).unwrap();
        router.route(1, Transaction::new("a", "b", 1, 1)).unwrap();

        assert_eq!(router.drain_all_into_pool(), 2);
        assert_eq!(router.queued(1).unwrap(), 0);
        assert_eq!(router.queued(2).unwrap(), 0);

        // Shard 1 drains first
        let amounts: Vec<u64> = pool.snapshot().iter().map(Transaction::amount).collect();
        assert_eq!(amounts, vec![1, 2]);
    }
}
