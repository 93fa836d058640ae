//! In-memory balance book using DashMap for concurrent access

use alsania_chain::Address;
use alsania_consensus::{LedgerMutation, MutationError};
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe account balances
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct BalanceBook {
    balances: Arc<DashMap<Address, u64>>,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts with a recorded balance
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// All balances sorted by address
    pub fn snapshot(&self) -> Vec<(Address, u64)> {
        let mut all: Vec<(Address, u64)> = self
            .balances
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect();
        all.sort();
        all
    }

    /// Sum of all balances
    pub fn total_supply(&self) -> u64 {
        self.balances.iter().fold(0u64, |acc, r| acc.saturating_add(*r.value()))
    }
}

impl LedgerMutation for BalanceBook {
    fn transfer(&self, from: &str, to: &str, amount: u64) -> Result<(), MutationError> {
        {
            let mut source = self
                .balances
                .get_mut(from)
                .filter(|b| **b >= amount)
                .ok_or_else(|| MutationError::InsufficientBalance {
                    address: from.to_string(),
                    balance: self.get_balance(from),
                    amount,
                })?;
            *source -= amount;
        }

        if let Err(e) = self.mint(to, amount) {
            // Put the debit back; `from` just held this amount so it fits
            if let Some(mut source) = self.balances.get_mut(from) {
                *source += amount;
            }
            return Err(e);
        }
        Ok(())
    }

    fn mint(&self, address: &str, amount: u64) -> Result<(), MutationError> {
        let mut balance = self.balances.entry(address.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| MutationError::Overflow(address.to_string()))?;
        Ok(())
    }

    fn get_balance(&self, address: &str) -> u64 {
        self.balances.get(address).map(|b| *b).unwrap_or(0)
    }
}
