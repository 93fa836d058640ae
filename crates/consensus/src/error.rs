//! Consensus error types

use crate::types::Phase;
use alsania_chain::{Address, Hash, ValidationError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid signature on transaction {tx} from {sender}")]
    InvalidTransactionSignature { tx: Hash, sender: Address },

    #[error("Transaction {tx} from {sender} is not signed")]
    MissingSignature { tx: Hash, sender: Address },

    #[error("Invalid vote signature from validator {0}")]
    InvalidVoteSignature(Address),

    #[error("Invalid proposal signature from validator {0}")]
    InvalidProposalSignature(Address),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("Unknown validator {0}")]
    UnknownValidator(Address),

    #[error("No open quorum record for block {0}")]
    UnknownBlock(Hash),

    #[error("Validator set is empty")]
    NoValidators,

    #[error("Block {hash} is {phase:?}, not committed")]
    NotCommitted { hash: Hash, phase: Phase },

    #[error("Stale proposal: expected at least {expected}, got {found}")]
    StaleProposal { expected: u64, found: u64 },

    #[error("Proposal round {found} is too far ahead of round {current}")]
    RoundTooFarAhead { current: u64, found: u64 },

    #[error("Height {height} round {round} belongs to {expected}, not {found}")]
    WrongProposer {
        height: u64,
        round: u64,
        expected: Address,
        found: Address,
    },

    #[error("Round {round} at height {height} timed out")]
    Timeout { height: u64, round: u64 },

    #[error("Invalid proposal: {0}")]
    InvalidProposal(#[from] ValidationError),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unknown peer {0}")]
    UnknownPeer(String),

    #[error("Outbound queue to {0} is full")]
    QueueFull(String),

    #[error("Link to {0} is closed")]
    Closed(String),
}
