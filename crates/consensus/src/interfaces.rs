//! Seams between consensus and the rest of the node
//!
//! Consensus never touches balances, keys or sockets directly; it is handed
//! implementations of these traits at construction.

use crate::error::TransportError;
use crate::types::{Proposal, Vote};
use alsania_chain::{Block, Validator};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("Insufficient balance: {address} holds {balance}, needs {amount}")]
    InsufficientBalance { address: String, balance: u64, amount: u64 },

    #[error("Balance overflow for {0}")]
    Overflow(String),
}

/// Account balance mutations
pub trait LedgerMutation: Send + Sync {
    fn transfer(&self, from: &str, to: &str, amount: u64) -> Result<(), MutationError>;

    fn mint(&self, address: &str, amount: u64) -> Result<(), MutationError>;

    fn get_balance(&self, address: &str) -> u64;
}

/// Signing and verification against registered public keys
pub trait KeyRegistry: Send + Sync {
    /// Sign `payload` with a 32-byte secret key
    fn sign(&self, payload: &[u8], secret_key: &[u8; 32]) -> Vec<u8>;

    fn verify(&self, public_key: &[u8; 32], payload: &[u8], signature: &[u8]) -> bool;

    fn get_public_key(&self, address: &str) -> Option<[u8; 32]>;
}

/// Called once per block appended to the chain
pub trait RewardHook: Send + Sync {
    fn on_confirmed(&self, block: &Block, proposer: &str, validators: &[Validator]);
}

/// Outbound peer messaging. Sends are queued and never wait on the network.
pub trait Transport: Send + Sync {
    fn send_block(&self, peer: &str, block: &Block) -> Result<(), TransportError>;

    fn broadcast_proposal(&self, proposal: &Proposal) -> Result<(), TransportError>;

    fn broadcast_vote(&self, vote: &Vote) -> Result<(), TransportError>;
}
