//! Validator identities and the append-only validator set

use crate::error::ShardError;
use crate::hash::serde_hex;
use crate::transaction::Address;
use borsh::{BorshDeserialize, BorshSerialize};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A staked validator
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Validator {
    /// Validator address
    pub id: Address,
    /// Staked amount (voting weight)
    pub stake: u64,
    /// ed25519 verifying key
    #[serde(with = "serde_hex::bytes32")]
    pub public_key: [u8; 32],
}

impl Validator {
    pub fn new(id: impl Into<Address>, stake: u64, public_key: [u8; 32]) -> Self {
        Self {
            id: id.into(),
            stake,
            public_key,
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Insertion order; proposer rotation walks this
    validators: Vec<Validator>,
    by_id: HashMap<Address, usize>,
    total_stake: u64,
}

/// Thread-safe, append-only validator set shared by the engine, the shard
/// router and the ledger
#[derive(Default)]
pub struct ValidatorSet {
    inner: RwLock<Inner>,
}

impl ValidatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from an initial list, rejecting duplicate ids
    pub fn with_validators(validators: Vec<Validator>) -> Result<Self, ShardError> {
        let set = Self::new();
        set.add_all(validators)?;
        Ok(set)
    }

    /// Append validators. All-or-nothing: if any id is already present (or
    /// repeated within `validators`) nothing is added.
    pub fn add_all(&self, validators: Vec<Validator>) -> Result<(), ShardError> {
        let mut inner = self.inner.write();

        let mut seen = HashSet::new();
        for v in &validators {
            if inner.by_id.contains_key(&v.id) || !seen.insert(v.id.as_str()) {
                return Err(ShardError::DuplicateValidator(v.id.clone()));
            }
        }

        for v in validators {
            let position = inner.validators.len();
            inner.total_stake = inner.total_stake.saturating_add(v.stake);
            inner.by_id.insert(v.id.clone(), position);
            inner.validators.push(v);
        }

        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Validator> {
        let inner = self.inner.read();
        inner.by_id.get(id).map(|&i| inner.validators[i].clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().by_id.contains_key(id)
    }

    pub fn stake_of(&self, id: &str) -> Option<u64> {
        let inner = self.inner.read();
        inner.by_id.get(id).map(|&i| inner.validators[i].stake)
    }

    /// Validator at `position` in insertion order
    pub fn at(&self, position: usize) -> Option<Validator> {
        self.inner.read().validators.get(position).cloned()
    }

    pub fn total_stake(&self) -> u64 {
        self.inner.read().total_stake
    }

    pub fn len(&self) -> usize {
        self.inner.read().validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().validators.is_empty()
    }

    /// Copy of all validators in insertion order
    pub fn snapshot(&self) -> Vec<Validator> {
        self.inner.read().validators.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let set = ValidatorSet::new();
        set.add_all(vec![Validator::new("v1", 10, [1; 32]), Validator::new("v2", 30, [2; 32])])
            .unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.total_stake(), 40);
        assert_eq!(set.stake_of("v2"), Some(30));
        assert_eq!(set.at(0).unwrap().id, "v1");
        assert!(set.get("v3").is_none());
    }

    #[test]
    fn test_duplicate_rejects_whole_batch() {
        let set = ValidatorSet::with_validators(vec![Validator::new("v1", 10, [1; 32])]).unwrap();

        let err = set
            .add_all(vec![Validator::new("v2", 10, [2; 32]), Validator::new("v1", 5, [3; 32])])
            .unwrap_err();
        assert_eq!(err, ShardError::DuplicateValidator("v1".to_string()));
        assert_eq!(set.len(), 1);
        assert_eq!(set.total_stake(), 10);

        let err = set
            .add_all(vec![Validator::new("v4", 1, [4; 32]), Validator::new("v4", 1, [4; 32])])
            .unwrap_err();
        assert_eq!(err, ShardError::DuplicateValidator("v4".to_string()));
        assert!(!set.contains("v4"));
    }
}
