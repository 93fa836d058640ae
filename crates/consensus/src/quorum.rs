//! Stake-weighted vote bookkeeping for one proposed block

use crate::types::{Phase, VotePhase};
use alsania_chain::{Address, Block, Hash};
use std::collections::HashMap;
use std::time::Instant;

/// Minimum stake that forms a quorum: `ceil(2 * total / 3)`
pub fn quorum_threshold(total_stake: u64) -> u64 {
    ((total_stake as u128 * 2 + 2) / 3) as u64
}

/// Zero total stake never reaches quorum
pub fn has_quorum(weight: u64, total_stake: u64) -> bool {
    total_stake > 0 && weight >= quorum_threshold(total_stake)
}

/// Votes collected for the live proposal
#[derive(Debug, Clone)]
pub struct QuorumRecord {
    block: Block,
    round: u64,
    proposer: Address,
    phase: Phase,
    /// validator -> stake at the time of the vote
    prepares: HashMap<Address, u64>,
    commits: HashMap<Address, u64>,
    opened_at: Instant,
}

impl QuorumRecord {
    pub fn new(block: Block, round: u64, proposer: Address, opened_at: Instant) -> Self {
        Self {
            block,
            round,
            proposer,
            phase: Phase::Proposed,
            prepares: HashMap::new(),
            commits: HashMap::new(),
            opened_at,
        }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn into_block(self) -> Block {
        self.block
    }

    pub fn hash(&self) -> &Hash {
        self.block.hash()
    }

    pub fn height(&self) -> u64 {
        self.block.index()
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn proposer(&self) -> &str {
        &self.proposer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// Record a vote; a repeat in the same phase overwrites. Returns whether
    /// the validator had not voted in this phase before.
    pub fn record(&mut self, validator_id: &str, stake: u64, phase: VotePhase) -> bool {
        let votes = match phase {
            VotePhase::Prepare => &mut self.prepares,
            VotePhase::Commit => &mut self.commits,
        };
        votes.insert(validator_id.to_string(), stake).is_none()
    }

    /// Stake behind the votes of a phase
    pub fn weight(&self, phase: VotePhase) -> u64 {
        let votes = match phase {
            VotePhase::Prepare => &self.prepares,
            VotePhase::Commit => &self.commits,
        };
        votes.values().fold(0u64, |acc, stake| acc.saturating_add(*stake))
    }

    /// Apply every transition the recorded votes allow. Commit votes only
    /// count once the block is prepared, so both may fire in one call.
    pub fn advance(&mut self, total_stake: u64) -> Phase {
        if self.phase == Phase::Proposed && has_quorum(self.weight(VotePhase::Prepare), total_stake) {
            self.phase = Phase::Prepared;
        }
        if self.phase == Phase::Prepared && has_quorum(self.weight(VotePhase::Commit), total_stake) {
            self.phase = Phase::Committed;
        }
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> QuorumRecord {
        let block = Block::new(1, Vec::new(), Hash::digest(b"parent"), 5);
        QuorumRecord::new(block, 0, "v1".to_string(), Instant::now())
    }

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(quorum_threshold(40), 27);
        assert!(has_quorum(27, 40));
        assert!(!has_quorum(26, 40));

        assert_eq!(quorum_threshold(100), 67);
        assert_eq!(quorum_threshold(3), 2);
        assert!(!has_quorum(0, 0));
        assert!(has_quorum(u64::MAX, u64::MAX));
    }

    #[test]
    fn test_double_vote_counts_once() {
        let mut record = record();
        assert!(record.record("v1", 10, VotePhase::Prepare));
        assert!(!record.record("v1", 10, VotePhase::Prepare));
        assert_eq!(record.weight(VotePhase::Prepare), 10);
        assert_eq!(record.weight(VotePhase::Commit), 0);
    }

    #[test]
    fn test_early_commits_count_after_prepare() {
        let mut record = record();
        for v in ["v1", "v2", "v3"] {
            record.record(v, 10, VotePhase::Commit);
        }
        assert_eq!(record.advance(40), Phase::Proposed);

        for v in ["v1", "v2"] {
            record.record(v, 10, VotePhase::Prepare);
        }
        assert_eq!(record.advance(40), Phase::Proposed);

        record.record("v4", 10, VotePhase::Prepare);
        assert_eq!(record.advance(40), Phase::Committed);
    }
}
