//! PaLa-style consensus engine
//!
//! One live height at a time, one open [`QuorumRecord`] at a time. A block
//! moves `Proposed -> Prepared -> Committed` as stake-weighted votes arrive,
//! then `Confirmed` once its transaction signatures check out. Tallying and
//! phase transitions happen under a single lock so concurrent votes can never
//! advance a block twice.
//!
//! Peer proposals are only taken from the validator the rotation names for
//! their `(height, round)`, under that validator's signature, and at most
//! [`MAX_ROUNDS_AHEAD`] rounds past the local one.

use crate::error::{ConsensusError, SignatureError};
use crate::interfaces::KeyRegistry;
use crate::proposer::select_proposer;
use crate::quorum::QuorumRecord;
use crate::types::{ConsensusConfig, ConsensusStats, Phase, Proposal, VotePhase};
use alsania_chain::{Address, Block, Hash, TransactionPool, ValidationError, Validator, ValidatorSet};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// How far past the local round a peer proposal may be
pub const MAX_ROUNDS_AHEAD: u64 = 16;

struct EngineState {
    /// Height the next confirmed block will occupy
    height: u64,
    round: u64,
    live: Option<QuorumRecord>,
    /// Confirmed but not yet appended: hash -> (height, proposer)
    confirmed: HashMap<Hash, (u64, Address)>,
    stats: ConsensusStats,
}

pub struct PalaEngine {
    validators: Arc<ValidatorSet>,
    pool: Arc<TransactionPool>,
    keys: Arc<dyn KeyRegistry>,
    config: ConsensusConfig,
    state: Mutex<EngineState>,
}

impl PalaEngine {
    pub fn new(
        validators: Arc<ValidatorSet>,
        pool: Arc<TransactionPool>,
        keys: Arc<dyn KeyRegistry>,
        config: ConsensusConfig,
    ) -> Self {
        Self {
            validators,
            pool,
            keys,
            config,
            state: Mutex::new(EngineState {
                height: 1,
                round: 0,
                live: None,
                confirmed: HashMap::new(),
                stats: ConsensusStats {
                    height: 1,
                    ..ConsensusStats::default()
                },
            }),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn validators(&self) -> &Arc<ValidatorSet> {
        &self.validators
    }

    pub fn keys(&self) -> &Arc<dyn KeyRegistry> {
        &self.keys
    }

    /// Proposer for `(height, round)`
    pub fn expected_proposer(&self, height: u64, round: u64) -> Option<Validator> {
        select_proposer(&self.validators, height, round)
    }

    /// Live `(height, round)`
    pub fn current_round(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.height, state.round)
    }

    /// Seal a candidate for `height` from the pending pool and open its
    /// quorum record. Replaces any earlier proposal for the same height.
    pub fn propose_block(&self, height: u64, previous_hash: Hash) -> Result<Block, ConsensusError> {
        let round = {
            let mut state = self.state.lock();
            Self::enter_height(&mut state, height)?;
            state.round
        };

        let proposer = self
            .expected_proposer(height, round)
            .ok_or(ConsensusError::NoValidators)?;

        // Sealing grinds nonces; keep it outside the lock
        let transactions = self.pool.snapshot_limited(self.config.max_txs_per_block);
        let block = Block::seal(
            height,
            transactions,
            previous_hash,
            alsania_chain::now_millis(),
            self.config.difficulty,
        );

        let mut state = self.state.lock();
        Self::enter_height(&mut state, height)?;
        // The round may have moved on while sealing
        let proposer = if state.round == round {
            proposer
        } else {
            self.expected_proposer(height, state.round)
                .ok_or(ConsensusError::NoValidators)?
        };
        tracing::debug!(
            "Proposed block {} at height {} round {} ({} txs, proposer {})",
            block.hash().short(),
            height,
            state.round,
            block.transactions().len(),
            proposer.id
        );
        let round = state.round;
        Self::open_record(&mut state, block.clone(), round, proposer.id);
        Ok(block)
    }

    /// Open a quorum record for a block proposed by a peer.
    ///
    /// The proposal must come from the expected proposer for its height and
    /// round, carry that validator's signature, and name a round no more
    /// than [`MAX_ROUNDS_AHEAD`] past the local one.
    pub fn accept_proposal(&self, proposal: Proposal) -> Result<(), ConsensusError> {
        let block = &proposal.block;
        block.check_integrity()?;
        if !alsania_chain::meets_difficulty(block.hash(), self.config.difficulty) {
            return Err(ValidationError::InsufficientDifficulty {
                hash: *block.hash(),
                difficulty: self.config.difficulty,
            }
            .into());
        }

        let height = block.index();
        let round = proposal.round;
        let proposer = self
            .expected_proposer(height, round)
            .ok_or(ConsensusError::NoValidators)?;
        if proposer.id != proposal.proposer {
            return Err(ConsensusError::WrongProposer {
                height,
                round,
                expected: proposer.id,
                found: proposal.proposer,
            });
        }
        self.verify_proposal_signature(&proposal, &proposer)?;

        let mut state = self.state.lock();
        if height < state.height {
            return Err(ConsensusError::StaleProposal {
                expected: state.height,
                found: height,
            });
        }
        // A later height starts over at round 0
        let current = if height == state.height { state.round } else { 0 };
        if round < current {
            return Err(ConsensusError::StaleProposal {
                expected: current,
                found: round,
            });
        }
        if round > current.saturating_add(MAX_ROUNDS_AHEAD) {
            return Err(ConsensusError::RoundTooFarAhead { current, found: round });
        }

        Self::enter_height(&mut state, height)?;
        if let Some(live) = &state.live {
            if live.hash() == block.hash() {
                return Ok(());
            }
        }

        tracing::debug!(
            "Accepted proposal {} at height {} round {} from {}",
            block.hash().short(),
            height,
            round,
            proposer.id
        );
        state.round = round;
        Self::open_record(&mut state, proposal.block, round, proposer.id);
        Ok(())
    }

    fn verify_proposal_signature(&self, proposal: &Proposal, proposer: &Validator) -> Result<(), SignatureError> {
        let valid = proposal
            .signature
            .as_deref()
            .is_some_and(|signature| self.keys.verify(&proposer.public_key, &proposal.signing_bytes(), signature));
        if !valid {
            return Err(SignatureError::InvalidProposalSignature(proposal.proposer.clone()));
        }
        Ok(())
    }

    /// Tally a vote and apply any transition it enables
    pub fn record_vote(&self, block_hash: &Hash, validator_id: &str, phase: VotePhase) -> Result<Phase, ConsensusError> {
        let stake = self
            .validators
            .stake_of(validator_id)
            .ok_or_else(|| ConsensusError::UnknownValidator(validator_id.to_string()))?;
        let total_stake = self.validators.total_stake();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let record = state
            .live
            .as_mut()
            .filter(|r| r.hash() == block_hash)
            .ok_or(ConsensusError::UnknownBlock(*block_hash))?;

        let before = record.phase();
        if !record.record(validator_id, stake, phase) {
            tracing::debug!("Repeat {:?} vote from {} on {}", phase, validator_id, block_hash.short());
        }
        let after = record.advance(total_stake);

        state.stats.votes_recorded += 1;
        state.stats.phase = after;
        if after != before {
            tracing::info!(
                "Block {} at height {}: {:?} -> {:?}",
                block_hash.short(),
                record.height(),
                before,
                after
            );
        }

        Ok(after)
    }

    /// Confirm a committed block after verifying its transaction signatures.
    ///
    /// On a signature failure the block is discarded and the round advances,
    /// so the next proposal comes from the next proposer in rotation.
    pub fn confirm_block(&self, block_hash: &Hash) -> Result<Block, ConsensusError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let record = match state.live.take() {
            Some(record) if record.hash() == block_hash => record,
            other => {
                state.live = other;
                return Err(ConsensusError::UnknownBlock(*block_hash));
            }
        };

        if record.phase() != Phase::Committed {
            let phase = record.phase();
            state.live = Some(record);
            return Err(ConsensusError::NotCommitted {
                hash: *block_hash,
                phase,
            });
        }

        if let Err(e) = self.verify_transactions(record.block()) {
            tracing::warn!(
                "Discarding block {} at height {}: {}",
                block_hash.short(),
                record.height(),
                e
            );
            state.round = state.round.saturating_add(1);
            state.stats.round = state.round;
            state.stats.phase = Phase::Idle;
            state.stats.rounds_abandoned += 1;
            return Err(e.into());
        }

        state
            .confirmed
            .insert(*block_hash, (record.height(), record.proposer().to_string()));
        state.stats.blocks_confirmed += 1;
        state.stats.phase = Phase::Confirmed;
        drop(guard);

        tracing::info!("Block {} at height {} confirmed", block_hash.short(), record.height());
        Ok(record.into_block())
    }

    fn verify_transactions(&self, block: &Block) -> Result<(), SignatureError> {
        for tx in block.transactions() {
            match tx.signature() {
                Some(signature) => {
                    let valid = self
                        .keys
                        .get_public_key(tx.sender())
                        .is_some_and(|key| self.keys.verify(&key, &tx.signing_bytes(), signature));
                    if !valid {
                        return Err(SignatureError::InvalidTransactionSignature {
                            tx: tx.id(),
                            sender: tx.sender().to_string(),
                        });
                    }
                }
                None if self.config.require_signatures => {
                    return Err(SignatureError::MissingSignature {
                        tx: tx.id(),
                        sender: tx.sender().to_string(),
                    });
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Drop the live proposal and move to the next round. Returns the hash of
    /// the abandoned block, if any.
    pub fn abandon_round(&self) -> Option<Hash> {
        let mut state = self.state.lock();
        let abandoned = state.live.take().map(|r| *r.hash());
        state.round = state.round.saturating_add(1);
        state.stats.round = state.round;
        state.stats.phase = Phase::Idle;
        state.stats.rounds_abandoned += 1;
        tracing::warn!(
            "Abandoned round at height {}, now round {}",
            state.height,
            state.round
        );
        abandoned
    }

    /// Abandon the live round if it has been open longer than the proposal timeout
    pub fn abandon_if_expired(&self, now: Instant) -> Result<(), ConsensusError> {
        let expired = {
            let state = self.state.lock();
            match &state.live {
                Some(record) => {
                    let age = now.saturating_duration_since(record.opened_at());
                    (age >= self.config.block_proposal_timeout)
                        .then_some((state.height, state.round))
                }
                None => None,
            }
        };

        match expired {
            Some((height, round)) => {
                self.abandon_round();
                Err(ConsensusError::Timeout { height, round })
            }
            None => Ok(()),
        }
    }

    pub fn phase_of(&self, block_hash: &Hash) -> Phase {
        let state = self.state.lock();
        if state.confirmed.contains_key(block_hash) {
            return Phase::Confirmed;
        }
        match &state.live {
            Some(record) if record.hash() == block_hash => record.phase(),
            _ => Phase::Idle,
        }
    }

    pub fn is_confirmed(&self, block_hash: &Hash) -> bool {
        self.state.lock().confirmed.contains_key(block_hash)
    }

    /// Proposer of a confirmed block that has not been appended yet
    pub fn confirmed_proposer(&self, block_hash: &Hash) -> Option<Address> {
        self.state
            .lock()
            .confirmed
            .get(block_hash)
            .map(|(_, proposer)| proposer.clone())
    }

    /// Block currently collecting votes
    pub fn live_block(&self) -> Option<Block> {
        self.state.lock().live.as_ref().map(|r| r.block().clone())
    }

    /// Round the live block was proposed in
    pub fn live_round(&self) -> Option<u64> {
        self.state.lock().live.as_ref().map(QuorumRecord::round)
    }

    /// Move past `height` once it is on the chain
    pub fn note_appended(&self, height: u64) {
        let mut state = self.state.lock();
        if height < state.height {
            state.confirmed.retain(|_, (h, _)| *h > height);
            return;
        }

        state.height = height + 1;
        state.round = 0;
        if state.live.as_ref().is_some_and(|r| r.height() <= height) {
            state.live = None;
        }
        state.confirmed.retain(|_, (h, _)| *h > height);
        state.stats.height = state.height;
        state.stats.round = 0;
        state.stats.phase = Phase::Idle;
    }

    pub fn stats(&self) -> ConsensusStats {
        self.state.lock().stats.clone()
    }

    /// Make `height` the live height; heights below it are stale
    fn enter_height(state: &mut EngineState, height: u64) -> Result<(), ConsensusError> {
        if height < state.height {
            return Err(ConsensusError::StaleProposal {
                expected: state.height,
                found: height,
            });
        }
        if height > state.height {
            state.height = height;
            state.round = 0;
            state.live = None;
            state.stats.height = height;
            state.stats.round = 0;
        }
        Ok(())
    }

    fn open_record(state: &mut EngineState, block: Block, round: u64, proposer: String) {
        if let Some(previous) = &state.live {
            tracing::debug!(
                "Proposal {} supersedes {} at height {}",
                block.hash().short(),
                previous.hash().short(),
                block.index()
            );
        }
        state.live = Some(QuorumRecord::new(block, round, proposer, Instant::now()));
        state.stats.proposals += 1;
        state.stats.round = round;
        state.stats.phase = Phase::Proposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{public_key_for, Ed25519KeyRegistry};
    use alsania_chain::Transaction;
    use std::time::Duration;

    fn secret(i: u8) -> [u8; 32] {
        [i + 1; 32]
    }

    fn engine_with(stakes: &[u64], config: ConsensusConfig) -> (PalaEngine, Arc<TransactionPool>, Arc<Ed25519KeyRegistry>) {
        let validators: Vec<Validator> = stakes
            .iter()
            .enumerate()
            .map(|(i, stake)| Validator::new(format!("v{}", i), *stake, public_key_for(&secret(i as u8))))
            .collect();
        let keys = Arc::new(Ed25519KeyRegistry::from_validators(&validators));
        let set = Arc::new(ValidatorSet::with_validators(validators).unwrap());
        let pool = Arc::new(TransactionPool::new());
        let engine = PalaEngine::new(set, pool.clone(), keys.clone(), config);
        (engine, pool, keys)
    }

    fn engine(stakes: &[u64]) -> (PalaEngine, Arc<TransactionPool>, Arc<Ed25519KeyRegistry>) {
        engine_with(stakes, ConsensusConfig::default())
    }

    /// A proposal for `block` signed by whichever validator the rotation names
    fn signed_proposal(engine: &PalaEngine, keys: &Ed25519KeyRegistry, block: Block, round: u64) -> Proposal {
        let proposer = engine.expected_proposer(block.index(), round).unwrap();
        let index: u8 = proposer.id[1..].parse().unwrap();
        let proposal = Proposal::new(block, round, proposer.id);
        let signature = keys.sign(&proposal.signing_bytes(), &secret(index));
        proposal.with_signature(signature)
    }

    fn vote_all(engine: &PalaEngine, hash: &Hash, voters: &[&str], phase: VotePhase) -> Phase {
        let mut last = Phase::Idle;
        for v in voters {
            last = engine.record_vote(hash, v, phase).unwrap();
        }
        last
    }

    #[test]
    fn test_propose_snapshots_pool_without_draining() {
        let (engine, pool, _) = engine(&[25, 25, 25, 25]);
        pool.add(Transaction::new("a", "b", 1, 1));
        pool.add(Transaction::new("a", "b", 2, 1));

        let block = engine.propose_block(1, Hash::digest(b"genesis")).unwrap();
        assert_eq!(block.transactions().len(), 2);
        assert!(alsania_chain::meets_difficulty(block.hash(), 1));
        assert_eq!(pool.len(), 2);
        assert_eq!(engine.phase_of(block.hash()), Phase::Proposed);
    }

    #[test]
    fn test_quorum_boundary_27_of_40() {
        let (engine, _, _) = engine(&[10, 10, 6, 1, 13]);
        let block = engine.propose_block(1, Hash::ZERO).unwrap();

        assert_eq!(vote_all(&engine, block.hash(), &["v0", "v1", "v2"], VotePhase::Prepare), Phase::Proposed);
        assert_eq!(engine.record_vote(block.hash(), "v3", VotePhase::Prepare).unwrap(), Phase::Prepared);
    }

    #[test]
    fn test_four_equal_validators_need_three() {
        let (engine, _, _) = engine(&[10, 10, 10, 10]);
        let block = engine.propose_block(1, Hash::ZERO).unwrap();

        assert_eq!(vote_all(&engine, block.hash(), &["v0", "v1"], VotePhase::Prepare), Phase::Proposed);
        assert_eq!(engine.record_vote(block.hash(), "v2", VotePhase::Prepare).unwrap(), Phase::Prepared);
    }

    #[test]
    fn test_double_vote_counts_once() {
        let (engine, _, _) = engine(&[10, 10, 10, 10]);
        let block = engine.propose_block(1, Hash::ZERO).unwrap();

        for _ in 0..3 {
            engine.record_vote(block.hash(), "v0", VotePhase::Prepare).unwrap();
            engine.record_vote(block.hash(), "v1", VotePhase::Prepare).unwrap();
        }
        assert_eq!(engine.phase_of(block.hash()), Phase::Proposed);
    }

    #[test]
    fn test_unknown_validator_and_block() {
        let (engine, _, _) = engine(&[10, 10]);
        let block = engine.propose_block(1, Hash::ZERO).unwrap();

        assert_eq!(
            engine.record_vote(block.hash(), "mallory", VotePhase::Prepare),
            Err(ConsensusError::UnknownValidator("mallory".to_string()))
        );
        let other = Hash::digest(b"other");
        assert_eq!(
            engine.record_vote(&other, "v0", VotePhase::Prepare),
            Err(ConsensusError::UnknownBlock(other))
        );
    }

    #[test]
    fn test_full_round_to_confirmed() {
        let (engine, pool, keys) = engine(&[25, 25, 25, 25]);
        let secret_a = [42u8; 32];
        keys.register("alice", public_key_for(&secret_a));

        let tx = Transaction::new("alice", "bob", 5, 1);
        let signature = keys.sign(&tx.signing_bytes(), &secret_a);
        pool.add(tx.with_signature(signature));
        pool.add(Transaction::new("carol", "dave", 1, 2));

        let block = engine.propose_block(1, Hash::ZERO).unwrap();
        let hash = *block.hash();

        assert!(matches!(engine.confirm_block(&hash), Err(ConsensusError::NotCommitted { .. })));

        assert_eq!(vote_all(&engine, &hash, &["v0", "v1", "v2"], VotePhase::Prepare), Phase::Prepared);
        assert_eq!(vote_all(&engine, &hash, &["v0", "v1", "v2"], VotePhase::Commit), Phase::Committed);

        let confirmed = engine.confirm_block(&hash).unwrap();
        assert_eq!(confirmed, block);
        assert!(engine.is_confirmed(&hash));
        assert_eq!(engine.confirmed_proposer(&hash).as_deref(), Some("v1"));
        assert_eq!(engine.phase_of(&hash), Phase::Confirmed);
        assert!(engine.live_block().is_none());

        engine.note_appended(1);
        assert!(!engine.is_confirmed(&hash));
        assert!(engine.confirmed_proposer(&hash).is_none());
        assert_eq!(engine.current_round(), (2, 0));
        assert_eq!(engine.stats().blocks_confirmed, 1);
    }

    #[test]
    fn test_bad_signature_discards_block() {
        let (engine, pool, _) = engine(&[25, 25, 25, 25]);
        pool.add(Transaction::new("v0", "bob", 5, 1).with_signature(vec![1; 64]));

        let block = engine.propose_block(1, Hash::ZERO).unwrap();
        let hash = *block.hash();
        vote_all(&engine, &hash, &["v0", "v1", "v2"], VotePhase::Prepare);
        vote_all(&engine, &hash, &["v0", "v1", "v2"], VotePhase::Commit);

        assert!(matches!(
            engine.confirm_block(&hash),
            Err(ConsensusError::Signature(SignatureError::InvalidTransactionSignature { .. }))
        ));
        assert_eq!(engine.phase_of(&hash), Phase::Idle);
        assert_eq!(engine.current_round(), (1, 1));
        assert_eq!(engine.expected_proposer(1, 1).unwrap().id, "v2");
    }

    #[test]
    fn test_require_signatures_rejects_unsigned() {
        let config = ConsensusConfig {
            require_signatures: true,
            ..Default::default()
        };
        let (engine, pool, _) = engine_with(&[10], config);
        pool.add(Transaction::new("a", "b", 1, 1));

        let block = engine.propose_block(1, Hash::ZERO).unwrap();
        engine.record_vote(block.hash(), "v0", VotePhase::Prepare).unwrap();
        engine.record_vote(block.hash(), "v0", VotePhase::Commit).unwrap();

        assert!(matches!(
            engine.confirm_block(block.hash()),
            Err(ConsensusError::Signature(SignatureError::MissingSignature { .. }))
        ));
    }

    #[test]
    fn test_new_proposal_supersedes() {
        let (engine, pool, _) = engine(&[10, 10, 10]);
        let first = engine.propose_block(1, Hash::ZERO).unwrap();
        engine.record_vote(first.hash(), "v0", VotePhase::Prepare).unwrap();

        pool.add(Transaction::new("a", "b", 1, 1));
        let second = engine.propose_block(1, Hash::ZERO).unwrap();
        assert_ne!(first.hash(), second.hash());

        assert_eq!(engine.phase_of(first.hash()), Phase::Idle);
        assert!(matches!(
            engine.record_vote(first.hash(), "v1", VotePhase::Prepare),
            Err(ConsensusError::UnknownBlock(_))
        ));
    }

    #[test]
    fn test_timeout_rotates_proposer() {
        let config = ConsensusConfig {
            block_proposal_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let (engine, _, _) = engine_with(&[10, 10, 10, 10], config);
        assert_eq!(engine.expected_proposer(1, 0).unwrap().id, "v1");

        let block = engine.propose_block(1, Hash::ZERO).unwrap();
        assert!(engine.abandon_if_expired(Instant::now()).is_ok());

        let later = Instant::now() + Duration::from_millis(100);
        assert_eq!(
            engine.abandon_if_expired(later),
            Err(ConsensusError::Timeout { height: 1, round: 0 })
        );
        assert_eq!(engine.phase_of(block.hash()), Phase::Idle);
        assert_eq!(engine.current_round(), (1, 1));
        assert_eq!(engine.expected_proposer(1, 1).unwrap().id, "v2");
        assert_eq!(engine.stats().rounds_abandoned, 1);
    }

    #[test]
    fn test_stale_and_peer_proposals() {
        let (engine, _, keys) = engine(&[10, 10, 10]);
        engine.note_appended(3);

        let old = Block::seal(2, Vec::new(), Hash::ZERO, 1, 1);
        assert_eq!(
            engine.accept_proposal(signed_proposal(&engine, &keys, old, 0)),
            Err(ConsensusError::StaleProposal { expected: 4, found: 2 })
        );

        let peer = Block::seal(4, Vec::new(), Hash::digest(b"tip"), 1, 1);
        engine
            .accept_proposal(signed_proposal(&engine, &keys, peer.clone(), 2))
            .unwrap();
        assert_eq!(engine.phase_of(peer.hash()), Phase::Proposed);
        assert_eq!(engine.live_round(), Some(2));

        let tampered = Block::from_parts(4, 1, Hash::ZERO, 0, Hash::ZERO, Vec::new(), Hash::digest(b"x"));
        assert!(matches!(
            engine.accept_proposal(signed_proposal(&engine, &keys, tampered, 2)),
            Err(ConsensusError::InvalidProposal(_))
        ));
    }

    #[test]
    fn test_unsigned_and_misattributed_proposals_rejected() {
        let (engine, _, keys) = engine(&[10, 10, 10, 10]);
        let block = Block::seal(1, Vec::new(), Hash::digest(b"genesis"), 1, 1);
        assert_eq!(engine.expected_proposer(1, 0).unwrap().id, "v1");

        let unsigned = Proposal::new(block.clone(), 0, "v1");
        assert_eq!(
            engine.accept_proposal(unsigned),
            Err(ConsensusError::Signature(SignatureError::InvalidProposalSignature("v1".to_string())))
        );

        // v2's key behind a proposal that claims to be v1's
        let mut forged = Proposal::new(block.clone(), 0, "v1");
        forged.signature = Some(keys.sign(&forged.signing_bytes(), &secret(2)));
        assert_eq!(
            engine.accept_proposal(forged),
            Err(ConsensusError::Signature(SignatureError::InvalidProposalSignature("v1".to_string())))
        );

        // Honestly signed by v2, but round 0 is v1's turn
        let early = Proposal::new(block.clone(), 0, "v2");
        let signature = keys.sign(&early.signing_bytes(), &secret(2));
        assert_eq!(
            engine.accept_proposal(early.with_signature(signature)),
            Err(ConsensusError::WrongProposer {
                height: 1,
                round: 0,
                expected: "v1".to_string(),
                found: "v2".to_string(),
            })
        );

        // v1 also leads round 4, but its round 0 signature does not carry over
        let mut replayed = signed_proposal(&engine, &keys, block.clone(), 0);
        replayed.round = 4;
        assert!(matches!(
            engine.accept_proposal(replayed),
            Err(ConsensusError::Signature(SignatureError::InvalidProposalSignature(_)))
        ));

        assert_eq!(engine.phase_of(block.hash()), Phase::Idle);
        assert_eq!(engine.current_round(), (1, 0));

        engine
            .accept_proposal(signed_proposal(&engine, &keys, block.clone(), 0))
            .unwrap();
        assert_eq!(engine.phase_of(block.hash()), Phase::Proposed);
    }

    #[test]
    fn test_far_future_round_rejected() {
        let (engine, _, keys) = engine(&[10, 10, 10]);
        let block = Block::seal(1, Vec::new(), Hash::ZERO, 1, 1);

        for round in [u64::MAX, MAX_ROUNDS_AHEAD + 1] {
            assert_eq!(
                engine.accept_proposal(signed_proposal(&engine, &keys, block.clone(), round)),
                Err(ConsensusError::RoundTooFarAhead { current: 0, found: round })
            );
        }
        assert_eq!(engine.current_round(), (1, 0));
        assert!(engine.live_block().is_none());

        engine
            .accept_proposal(signed_proposal(&engine, &keys, block.clone(), MAX_ROUNDS_AHEAD))
            .unwrap();
        assert_eq!(engine.current_round(), (1, MAX_ROUNDS_AHEAD));
        assert_eq!(engine.live_round(), Some(MAX_ROUNDS_AHEAD));
    }

    #[test]
    fn test_round_counter_saturates() {
        let (engine, pool, _) = engine(&[25, 25, 25, 25]);
        engine.state.lock().round = u64::MAX;

        assert!(engine.abandon_round().is_none());
        assert_eq!(engine.current_round(), (1, u64::MAX));

        pool.add(Transaction::new("v0", "bob", 5, 1).with_signature(vec![1; 64]));
        let block = engine.propose_block(1, Hash::ZERO).unwrap();
        vote_all(&engine, block.hash(), &["v0", "v1", "v2"], VotePhase::Prepare);
        vote_all(&engine, block.hash(), &["v0", "v1", "v2"], VotePhase::Commit);
        assert!(matches!(engine.confirm_block(block.hash()), Err(ConsensusError::Signature(_))));
        assert_eq!(engine.current_round(), (1, u64::MAX));
    }

    #[test]
    fn test_zero_stake_never_reaches_quorum() {
        let (engine, _, _) = engine(&[0, 0]);
        let block = engine.propose_block(1, Hash::ZERO).unwrap();
        assert_eq!(vote_all(&engine, block.hash(), &["v0", "v1"], VotePhase::Prepare), Phase::Proposed);
    }
}
