//! Stake-proportional block rewards

use alsania_chain::{Block, Validator};
use alsania_consensus::{LedgerMutation, RewardHook};
use std::sync::Arc;

/// Mints `block_reward` per confirmed block, split across validators by
/// stake. Integer rounding leftovers go to the block's proposer.
pub struct StakeRewards {
    balances: Arc<dyn LedgerMutation>,
    block_reward: u64,
}

impl StakeRewards {
    pub fn new(balances: Arc<dyn LedgerMutation>, block_reward: u64) -> Self {
        Self {
            balances,
            block_reward,
        }
    }

    /// Per-validator shares, proposer remainder included
    pub fn shares(&self, proposer: &str, validators: &[Validator]) -> Vec<(String, u64)> {
        let total_stake: u128 = validators.iter().map(|v| v.stake as u128).sum();
        let mut shares = Vec::with_capacity(validators.len() + 1);
        let mut distributed = 0u64;

        if total_stake > 0 {
            for v in validators {
                let share = (self.block_reward as u128 * v.stake as u128 / total_stake) as u64;
                if share > 0 {
                    shares.push((v.id.clone(), share));
                    distributed += share;
                }
            }
        }

        let remainder = self.block_reward - distributed;
        if remainder > 0 {
            shares.push((proposer.to_string(), remainder));
        }
        shares
    }
}

impl RewardHook for StakeRewards {
    fn on_confirmed(&self, block: &Block, proposer: &str, validators: &[Validator]) {
        if self.block_reward == 0 {
            return;
        }

        for (address, amount) in self.shares(proposer, validators) {
            if let Err(e) = self.balances.mint(&address, amount) {
                tracing::error!("Reward mint for {} at block {} failed: {}", address, block.index(), e);
            }
        }

        tracing::debug!(
            "Distributed {} reward for block {} across {} validators",
            self.block_reward,
            block.index(),
            validators.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balances::BalanceBook;

    #[test]
    fn test_pro_rata_with_remainder_to_proposer() {
        let book = Arc::new(BalanceBook::new());
        let rewards = StakeRewards::new(book.clone(), 100);
        let validators = vec![
            Validator::new("v0", 1, [0; 32]),
            Validator::new("v1", 1, [1; 32]),
            Validator::new("v2", 1, [2; 32]),
        ];

        rewards.on_confirmed(&Block::genesis(0), "v1", &validators);

        assert_eq!(book.get_balance("v0"), 33);
        assert_eq!(book.get_balance("v1"), 34);
        assert_eq!(book.get_balance("v2"), 33);
        assert_eq!(book.total_supply(), 100);
    }

    #[test]
    fn test_zero_stake_pays_proposer() {
        let book = Arc::new(BalanceBook::new());
        let rewards = StakeRewards::new(book.clone(), 10);
        rewards.on_confirmed(&Block::genesis(0), "v0", &[Validator::new("v0", 0, [0; 32])]);
        assert_eq!(book.get_balance("v0"), 10);
    }
}
