//! Merkle root over an ordered transaction sequence

use crate::hash::Hash;
use crate::transaction::Transaction;

/// Root of an empty transaction sequence
pub const EMPTY_MERKLE_ROOT: Hash = Hash::ZERO;

/// Compute the merkle root of `transactions`.
///
/// Leaves are transaction ids. Adjacent pairs are combined left to right as
/// `H(left || right)`; an unpaired last node is carried up unchanged.
/// Order-sensitive: swapping two distinct transactions changes the root.
pub fn compute_merkle_root(transactions: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = transactions.iter().map(Transaction::id).collect();
    merkle_root_from_leaves(leaves)
}

/// Merkle root from precomputed leaf hashes
pub fn merkle_root_from_leaves(mut level: Vec<Hash>) -> Hash {
    if level.is_empty() {
        return EMPTY_MERKLE_ROOT;
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            if let [left, right] = pair {
                next.push(Hash::combine(left, right));
            } else {
                next.push(pair[0]);
            }
        }
        level = next;
    }

    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txs(n: u64) -> Vec<Transaction> {
        (0..n).map(|i| Transaction::new("alice", "bob", i + 1, 1_000 + i)).collect()
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(compute_merkle_root(&[]), EMPTY_MERKLE_ROOT);
        let one = txs(1);
        assert_eq!(compute_merkle_root(&one), one[0].id());
    }

    #[test]
    fn test_odd_leaf_is_carried_up() {
        let t = txs(3);
        let expected = Hash::combine(&Hash::combine(&t[0].id(), &t[1].id()), &t[2].id());
        assert_eq!(compute_merkle_root(&t), expected);
    }

    #[test]
    fn test_reordering_changes_root() {
        let t = txs(5);
        let root = compute_merkle_root(&t);
        for i in 0..t.len() {
            for j in (i + 1)..t.len() {
                let mut swapped = t.clone();
                swapped.swap(i, j);
                assert_ne!(compute_merkle_root(&swapped), root, "swap {} <-> {}", i, j);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let t = txs(7);
        assert_eq!(compute_merkle_root(&t), compute_merkle_root(&t.clone()));
    }
}
