//! Core types for consensus and peer messaging

use alsania_chain::hash::serde_hex;
use alsania_chain::{Address, Block, Hash, DEFAULT_DIFFICULTY, MAX_TXS_PER_BLOCK};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Progress of the live height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Proposed,
    Prepared,
    Committed,
    Confirmed,
}

/// The two voting phases of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum VotePhase {
    Prepare,
    Commit,
}

/// A validator's vote for a proposed block
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Vote {
    pub height: u64,
    pub round: u64,
    pub block_hash: Hash,
    pub validator_id: Address,
    pub phase: VotePhase,
    /// ed25519 signature over [`Vote::signing_bytes`]
    #[serde(default, with = "serde_hex::opt_bytes", skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<u8>>,
}

impl Vote {
    pub fn new(height: u64, round: u64, block_hash: Hash, validator_id: impl Into<Address>, phase: VotePhase) -> Self {
        Self {
            height,
            round,
            block_hash,
            validator_id: validator_id.into(),
            phase,
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Bytes covered by the voter's signature (every field but the signature)
    pub fn signing_bytes(&self) -> Vec<u8> {
        borsh::to_vec(&(
            self.height,
            self.round,
            &self.block_hash,
            &self.validator_id,
            self.phase,
        ))
        .expect("Vote payload serialization should not fail")
    }
}

/// A sealed candidate for the live height, signed by its proposer
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Proposal {
    pub block: Block,
    pub round: u64,
    /// Validator expected to propose at `(block.index(), round)`
    pub proposer: Address,
    /// ed25519 signature over [`Proposal::signing_bytes`]
    #[serde(default, with = "serde_hex::opt_bytes", skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<u8>>,
}

impl Proposal {
    pub fn new(block: Block, round: u64, proposer: impl Into<Address>) -> Self {
        Self {
            block,
            round,
            proposer: proposer.into(),
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn height(&self) -> u64 {
        self.block.index()
    }

    /// The block hash commits to every header field, so signing it with the
    /// height, round and proposer covers the whole proposal.
    pub fn signing_bytes(&self) -> Vec<u8> {
        borsh::to_vec(&(self.block.index(), self.round, self.block.hash(), &self.proposer))
            .expect("Proposal payload serialization should not fail")
    }
}

/// Message types exchanged between validators
#[derive(Debug, Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum ConsensusMessage {
    /// A sealed candidate for the live height
    Proposal(Proposal),

    /// A prepare or commit vote
    Vote(Vote),

    /// A block the sender has confirmed and appended
    Block(Block),
}

impl ConsensusMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("ConsensusMessage serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// Consensus tuning
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Leading zero hex digits every proposed block hash needs
    pub difficulty: u32,
    /// Upper bound on transactions taken from the pool per proposal
    pub max_txs_per_block: usize,
    /// How long a round may stay unconfirmed before it is abandoned
    pub block_proposal_timeout: Duration,
    /// Reject unsigned transactions at confirmation
    pub require_signatures: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            max_txs_per_block: MAX_TXS_PER_BLOCK,
            block_proposal_timeout: Duration::from_secs(10),
            require_signatures: false,
        }
    }
}

/// Stats about the consensus engine
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusStats {
    pub height: u64,
    pub round: u64,
    pub phase: Phase,
    pub proposals: u64,
    pub votes_recorded: u64,
    pub blocks_confirmed: u64,
    pub rounds_abandoned: u64,
}

impl Default for ConsensusStats {
    fn default() -> Self {
        Self {
            height: 0,
            round: 0,
            phase: Phase::Idle,
            proposals: 0,
            votes_recorded: 0,
            blocks_confirmed: 0,
            rounds_abandoned: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alsania_chain::Transaction;

    #[test]
    fn test_vote_signing_bytes_exclude_signature() {
        let vote = Vote::new(3, 1, Hash::digest(b"block"), "v1", VotePhase::Prepare);
        let signed = vote.clone().with_signature(vec![9; 64]);
        assert_eq!(vote.signing_bytes(), signed.signing_bytes());

        let commit = Vote::new(3, 1, Hash::digest(b"block"), "v1", VotePhase::Commit);
        assert_ne!(vote.signing_bytes(), commit.signing_bytes());
    }

    #[test]
    fn test_proposal_signing_bytes_cover_round_and_proposer() {
        let block = Block::new(1, Vec::new(), Hash::digest(b"p"), 7);
        let proposal = Proposal::new(block.clone(), 2, "v1");
        let signed = proposal.clone().with_signature(vec![9; 64]);
        assert_eq!(proposal.signing_bytes(), signed.signing_bytes());

        assert_ne!(proposal.signing_bytes(), Proposal::new(block.clone(), 3, "v1").signing_bytes());
        assert_ne!(proposal.signing_bytes(), Proposal::new(block, 2, "v2").signing_bytes());
    }

    #[test]
    fn test_message_wire_format() {
        let block = Block::new(1, vec![Transaction::new("a", "b", 1, 1)], Hash::digest(b"p"), 7);
        let proposal = Proposal::new(block.clone(), 2, "v3").with_signature(vec![5; 64]);
        let msg = ConsensusMessage::Proposal(proposal.clone());

        match ConsensusMessage::from_bytes(&msg.to_bytes()).unwrap() {
            ConsensusMessage::Proposal(decoded) => {
                assert_eq!(decoded, proposal);
                assert_eq!(decoded.block, block);
                assert_eq!(decoded.height(), 1);
            }
            other => panic!("unexpected message {:?}", other),
        }

        assert!(ConsensusMessage::from_bytes(&[0xff, 0x01]).is_err());
    }
}
