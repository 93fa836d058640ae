//! Alsania Consensus - PaLa-style BFT over proof of stake
//!
//! Architecture:
//! - A deterministic round-robin proposer seals a block from the pool and
//!   signs the proposal; peers only accept it from that proposer
//! - Validators cast prepare then commit votes; each phase advances once
//!   votes worth at least two thirds of total stake are recorded
//! - A committed block is confirmed after its transaction signatures verify
//! - Proposals, votes and confirmed blocks travel between peers over WebSocket

pub mod broadcast;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod keys;
pub mod proposer;
pub mod quorum;
pub mod types;

pub use broadcast::{TransportStats, WsTransport};
pub use engine::{PalaEngine, MAX_ROUNDS_AHEAD};
pub use error::{ConsensusError, SignatureError, TransportError};
pub use interfaces::{KeyRegistry, LedgerMutation, MutationError, RewardHook, Transport};
pub use keys::Ed25519KeyRegistry;
pub use proposer::select_proposer;
pub use quorum::{has_quorum, quorum_threshold, QuorumRecord};
pub use types::*;
