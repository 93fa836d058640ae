//! Pending transaction pool
//!
//! Keyed by content hash for deduplication, ordered by arrival so every
//! snapshot (and therefore every proposal) is reproducible. Snapshots never
//! remove anything: transactions leave the pool only when a block carrying
//! them is appended, so a transaction added while a proposal is in flight is
//! either in that block or still pending for the next one.

use crate::error::PoolError;
use crate::hash::Hash;
use crate::transaction::Transaction;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Inner {
    /// id -> arrival sequence
    by_id: HashMap<Hash, u64>,
    /// arrival sequence -> transaction
    ordered: BTreeMap<u64, Transaction>,
    next_seq: u64,
}

/// Thread-safe in-memory pool of unconfirmed transactions
#[derive(Default)]
pub struct TransactionPool {
    inner: Mutex<Inner>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless already pending; returns the transaction id
    pub fn try_add(&self, transaction: Transaction) -> Result<Hash, PoolError> {
        let id = transaction.id();
        let mut inner = self.inner.lock();
        if inner.by_id.contains_key(&id) {
            return Err(PoolError::Duplicate(id));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.by_id.insert(id, seq);
        inner.ordered.insert(seq, transaction);
        Ok(id)
    }

    /// Idempotent insert; returns whether the transaction was new
    pub fn add(&self, transaction: Transaction) -> bool {
        self.try_add(transaction).is_ok()
    }

    /// Remove by content hash, ignoring transactions that are not pending.
    /// Returns how many were removed.
    pub fn remove_many(&self, transactions: &[Transaction]) -> usize {
        let mut inner = self.inner.lock();
        let mut removed = 0;
        for tx in transactions {
            if let Some(seq) = inner.by_id.remove(&tx.id()) {
                inner.ordered.remove(&seq);
                removed += 1;
            }
        }
        removed
    }

    /// All pending transactions in arrival order
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.inner.lock().ordered.values().cloned().collect()
    }

    /// The first `max` pending transactions in arrival order
    pub fn snapshot_limited(&self, max: usize) -> Vec<Transaction> {
        self.inner.lock().ordered.values().take(max).cloned().collect()
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.inner.lock().by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tx(amount: u64) -> Transaction {
        Transaction::new("alice", "bob", amount, 1_000)
    }

    #[test]
    fn test_duplicate_is_noop() {
        let pool = TransactionPool::new();
        assert!(pool.add(tx(1)));
        assert!(!pool.add(tx(1)));
        assert_eq!(pool.try_add(tx(1)), Err(PoolError::Duplicate(tx(1).id())));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_snapshot_keeps_arrival_order() {
        let pool = TransactionPool::new();
        for amount in [5, 3, 9, 1] {
            pool.add(tx(amount));
        }

        let amounts: Vec<u64> = pool.snapshot().iter().map(Transaction::amount).collect();
        assert_eq!(amounts, vec![5, 3, 9, 1]);
        assert_eq!(pool.snapshot_limited(2).len(), 2);
        // Snapshots do not drain
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn test_remove_many_tolerates_missing() {
        let pool = TransactionPool::new();
        pool.add(tx(1));
        pool.add(tx(2));

        assert_eq!(pool.remove_many(&[tx(1), tx(7)]), 1);
        assert_eq!(pool.remove_many(&[tx(1)]), 0);
        assert!(!pool.contains(&tx(1).id()));
        assert!(pool.contains(&tx(2).id()));
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let pool = Arc::new(TransactionPool::new());
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for i in 0..250u64 {
                        pool.add(tx(t * 1_000 + i));
                    }
                })
            })
            .collect();

        let snapshot_during = pool.snapshot();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.len(), 1_000);
        pool.remove_many(&snapshot_during);
        assert_eq!(pool.len(), 1_000 - snapshot_during.len());
    }
}
