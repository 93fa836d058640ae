//! Ledger - owns the canonical chain and drives blocks onto it
//!
//! The chain sits behind one mutex: validation against the tail and the
//! append itself happen under the same lock, so two confirmed blocks can
//! never both extend the same tail. Block rewards are paid from the append,
//! never for a block that did not make it onto the chain.

use crate::error::LedgerError;
use alsania_chain::{
    Address, Block, ChainMetadata, ChainStore, Hash, ShardId, ShardRouter, Transaction, TransactionPool,
    ValidationError, ValidatorSet,
};
use alsania_consensus::{
    ConsensusConfig, ConsensusError, ConsensusMessage, KeyRegistry, PalaEngine, Phase, Proposal, RewardHook,
    SignatureError, Transport, Vote, VotePhase,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The validator this node votes and proposes as
#[derive(Clone)]
pub struct LocalValidator {
    pub id: Address,
    /// ed25519 secret seed
    pub secret_key: [u8; 32],
}

impl fmt::Debug for LocalValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalValidator").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Ledger configuration
#[derive(Debug, Clone, Default)]
pub struct LedgerConfig {
    pub consensus: ConsensusConfig,
    /// Genesis block timestamp (unix millis); every node must agree on it
    pub genesis_timestamp: u64,
    /// Propose even when the pool is empty
    pub allow_empty_blocks: bool,
    pub local_validator: Option<LocalValidator>,
}

pub struct Ledger {
    config: LedgerConfig,
    chain: Mutex<Vec<Block>>,
    engine: PalaEngine,
    validators: Arc<ValidatorSet>,
    pool: Arc<TransactionPool>,
    router: ShardRouter,
    peers: RwLock<Vec<String>>,
    transport: Arc<dyn Transport>,
    rewards: Option<Arc<dyn RewardHook>>,
    store: Option<ChainStore>,
    /// Votes this node has cast for the live height
    local_votes: Mutex<HashSet<(Hash, VotePhase)>>,
}

impl Ledger {
    pub fn new(
        config: LedgerConfig,
        validators: Arc<ValidatorSet>,
        keys: Arc<dyn KeyRegistry>,
        transport: Arc<dyn Transport>,
        rewards: Option<Arc<dyn RewardHook>>,
    ) -> Self {
        let pool = Arc::new(TransactionPool::new());
        let router = ShardRouter::new(validators.clone(), pool.clone());
        let engine = PalaEngine::new(validators.clone(), pool.clone(), keys, config.consensus.clone());

        Self {
            config,
            chain: Mutex::new(Vec::new()),
            engine,
            validators,
            pool,
            router,
            peers: RwLock::new(Vec::new()),
            transport,
            rewards,
            store: None,
            local_votes: Mutex::new(HashSet::new()),
        }
    }

    /// Attach a chain store and resume from whatever it holds. The stored
    /// chain is fully re-verified; any defect is fatal.
    pub fn open(mut self, store: ChainStore) -> Result<Self, LedgerError> {
        let chain = store.load_chain(self.config.consensus.difficulty)?;

        if let Some(genesis) = chain.first() {
            let configured = Block::genesis(self.config.genesis_timestamp);
            if genesis.hash() != configured.hash() {
                return Err(LedgerError::GenesisMismatch {
                    stored: *genesis.hash(),
                    configured: *configured.hash(),
                });
            }
        }

        if let Some(tail) = chain.last() {
            self.engine.note_appended(tail.index());
            tracing::info!("Resumed chain at height {} (tip {})", tail.index(), tail.hash().short());
        }

        *self.chain.get_mut() = chain;
        self.store = Some(store);
        Ok(self)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn engine(&self) -> &PalaEngine {
        &self.engine
    }

    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    pub fn pool(&self) -> &Arc<TransactionPool> {
        &self.pool
    }

    pub fn validators(&self) -> &Arc<ValidatorSet> {
        &self.validators
    }

    /// Append block 0. Only valid on an empty chain.
    pub fn create_genesis(&self) -> Result<Block, LedgerError> {
        let mut chain = self.chain.lock();
        if !chain.is_empty() {
            return Err(LedgerError::GenesisExists);
        }

        let genesis = Block::genesis(self.config.genesis_timestamp);
        if let Some(store) = &self.store {
            store.store_block(&genesis)?;
            Self::save_metadata(store, &genesis, 1);
        }
        chain.push(genesis.clone());

        tracing::info!("Created genesis block {}", genesis.hash().short());
        Ok(genesis)
    }

    /// Structural and consensus checks against the current tail
    pub fn check_block(&self, block: &Block) -> Result<(), ValidationError> {
        let chain = self.chain.lock();
        self.check_against(&chain, block)
    }

    pub fn validate_block(&self, block: &Block) -> bool {
        match self.check_block(block) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Block {} failed validation: {}", block.hash().short(), e);
                false
            }
        }
    }

    fn check_against(&self, chain: &[Block], block: &Block) -> Result<(), ValidationError> {
        let tail = chain.last().ok_or(ValidationError::EmptyChain)?;
        block.check_extends(tail, self.config.consensus.difficulty)?;
        if !self.engine.is_confirmed(block.hash()) {
            return Err(ValidationError::NotConfirmed(*block.hash()));
        }
        Ok(())
    }

    /// Validate and append a confirmed block, then send it to every peer
    pub fn append(&self, block: Block) -> Result<(), LedgerError> {
        self.append_inner(&block)?;
        self.propagate(&block);
        Ok(())
    }

    fn append_inner(&self, block: &Block) -> Result<(), LedgerError> {
        let mut chain = self.chain.lock();
        self.check_against(&chain, block)?;

        if let Some(store) = &self.store {
            store.store_block(block)?;
        }
        let proposer = self.engine.confirmed_proposer(block.hash());
        chain.push(block.clone());
        let removed = self.pool.remove_many(block.transactions());
        self.engine.note_appended(block.index());
        self.local_votes.lock().clear();

        if let Some(store) = &self.store {
            Self::save_metadata(store, block, chain.len() as u64);
        }

        tracing::info!(
            "Appended block {} at height {} ({} txs, {} left the pool)",
            block.hash().short(),
            block.index(),
            block.transactions().len(),
            removed
        );

        if let (Some(hook), Some(proposer)) = (&self.rewards, proposer) {
            hook.on_confirmed(block, &proposer, &self.validators.snapshot());
        }
        Ok(())
    }

    fn save_metadata(store: &ChainStore, tip: &Block, height: u64) {
        let metadata = ChainMetadata {
            height,
            tip_hash: *tip.hash(),
            last_save_ts: alsania_chain::now_millis() as i64,
        };
        if let Err(e) = store.save_metadata(&metadata) {
            tracing::error!("Failed to save chain metadata: {}", e);
        }
    }

    fn propagate(&self, block: &Block) {
        for peer in self.peers.read().iter() {
            if let Err(e) = self.transport.send_block(peer, block) {
                tracing::warn!("Failed to send block {} to {}: {}", block.index(), peer, e);
            }
        }
    }

    /// Queue a transaction on a shard; returns its id
    pub fn submit_transaction(&self, shard_id: ShardId, transaction: Transaction) -> Result<Hash, LedgerError> {
        let id = transaction.id();
        self.router.route(shard_id, transaction)?;
        tracing::debug!("Queued transaction {} on shard {}", id.short(), shard_id);
        Ok(id)
    }

    /// Decode a borsh block from a peer and append it. Returns its height.
    pub fn submit_peer_block(&self, bytes: &[u8]) -> Result<u64, LedgerError> {
        let block = Block::from_bytes(bytes).map_err(|e| LedgerError::Decode(e.to_string()))?;
        self.accept_peer_block(block)
    }

    /// Append a block another validator appended. If our own round got it to
    /// `Committed`, confirm it here first.
    fn accept_peer_block(&self, block: Block) -> Result<u64, LedgerError> {
        if self.engine.phase_of(block.hash()) == Phase::Committed {
            self.engine.confirm_block(block.hash())?;
        }
        let height = block.index();
        self.append_inner(&block)?;
        Ok(height)
    }

    /// Index of the tail block; 0 for a chain holding only genesis (or nothing)
    pub fn height(&self) -> u64 {
        self.chain.lock().last().map(Block::index).unwrap_or(0)
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.chain.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.lock().is_empty()
    }

    pub fn block(&self, index: u64) -> Option<Block> {
        self.chain.lock().get(index as usize).cloned()
    }

    pub fn tail(&self) -> Option<Block> {
        self.chain.lock().last().cloned()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn add_peer(&self, addr: impl Into<String>) {
        let addr = addr.into();
        let mut peers = self.peers.write();
        if !peers.contains(&addr) {
            tracing::info!("Added peer {}", addr);
            peers.push(addr);
        }
    }

    pub fn peers(&self) -> Vec<String> {
        self.peers.read().clone()
    }

    pub fn store(&self) -> Option<&ChainStore> {
        self.store.as_ref()
    }

    /// Flush the attached store
    pub fn flush(&self) -> Result<(), LedgerError> {
        if let Some(store) = &self.store {
            store.flush()?;
        }
        Ok(())
    }

    /// Dispatch a message received from a peer
    pub fn handle_message(&self, message: ConsensusMessage) -> Result<(), LedgerError> {
        match message {
            ConsensusMessage::Proposal(proposal) => self.on_proposal(proposal),
            ConsensusMessage::Vote(vote) => self.on_vote(vote).map(|_| ()),
            ConsensusMessage::Block(block) => self.accept_peer_block(block).map(|_| ()),
        }
    }

    /// Check a peer proposal against the tail, let the engine authenticate
    /// it, then vote on it
    fn on_proposal(&self, proposal: Proposal) -> Result<(), LedgerError> {
        {
            let chain = self.chain.lock();
            let tail = chain.last().ok_or(ValidationError::EmptyChain)?;
            proposal.block.check_extends(tail, self.config.consensus.difficulty)?;
        }

        let hash = *proposal.block.hash();
        let height = proposal.height();
        let round = proposal.round;
        self.engine.accept_proposal(proposal)?;
        self.vote_locally(&hash, height, round);
        Ok(())
    }

    /// Verify a signed vote and tally it
    pub fn on_vote(&self, vote: Vote) -> Result<Phase, LedgerError> {
        self.verify_vote(&vote)?;
        let phase = self
            .engine
            .record_vote(&vote.block_hash, &vote.validator_id, vote.phase)?;

        if matches!(phase, Phase::Prepared | Phase::Committed) {
            self.vote_locally(&vote.block_hash, vote.height, vote.round);
        }
        Ok(phase)
    }

    fn verify_vote(&self, vote: &Vote) -> Result<(), ConsensusError> {
        let validator = self
            .validators
            .get(&vote.validator_id)
            .ok_or_else(|| ConsensusError::UnknownValidator(vote.validator_id.clone()))?;

        let valid = vote.signature.as_deref().is_some_and(|signature| {
            self.engine
                .keys()
                .verify(&validator.public_key, &vote.signing_bytes(), signature)
        });
        if !valid {
            return Err(SignatureError::InvalidVoteSignature(vote.validator_id.clone()).into());
        }
        Ok(())
    }

    /// Cast this node's prepare vote, and its commit vote once the block is
    /// prepared. Each vote is cast at most once per block.
    fn vote_locally(&self, block_hash: &Hash, height: u64, round: u64) {
        let Some(local) = &self.config.local_validator else {
            return;
        };
        if !self.validators.contains(&local.id) {
            return;
        }

        for phase in [VotePhase::Prepare, VotePhase::Commit] {
            if phase == VotePhase::Commit
                && !matches!(self.engine.phase_of(block_hash), Phase::Prepared | Phase::Committed)
            {
                break;
            }
            if !self.local_votes.lock().insert((*block_hash, phase)) {
                continue;
            }

            let vote = Vote::new(height, round, *block_hash, local.id.clone(), phase);
            let signature = self.engine.keys().sign(&vote.signing_bytes(), &local.secret_key);
            let vote = vote.with_signature(signature);

            match self.engine.record_vote(block_hash, &local.id, phase) {
                Ok(now) => tracing::debug!("Cast {:?} vote on {} ({:?})", phase, block_hash.short(), now),
                Err(e) => {
                    tracing::warn!("Local {:?} vote on {} rejected: {}", phase, block_hash.short(), e);
                    return;
                }
            }
            if let Err(e) = self.transport.broadcast_vote(&vote) {
                tracing::warn!("Failed to broadcast vote: {}", e);
            }
        }
    }

    /// Whether this node should start a round now
    pub fn should_propose(&self) -> bool {
        let Some(local) = &self.config.local_validator else {
            return false;
        };
        if self.engine.live_block().is_some() {
            return false;
        }
        if self.pool.is_empty() && !self.config.allow_empty_blocks {
            return false;
        }
        let Some(tail) = self.tail() else {
            return false;
        };

        let (height, round) = self.engine.current_round();
        height == tail.index() + 1
            && self
                .engine
                .expected_proposer(height, round)
                .is_some_and(|v| v.id == local.id)
    }

    /// Run one full round: drain shards, propose, handle inbound peer
    /// messages in arrival order until the block is committed, then confirm,
    /// validate and append.
    ///
    /// Any failure abandons the round and leaves the chain unchanged.
    pub async fn reach_consensus(
        &self,
        inbound: &mut mpsc::Receiver<ConsensusMessage>,
    ) -> Result<Block, LedgerError> {
        let local = self.config.local_validator.clone().ok_or(LedgerError::NotAValidator)?;

        match self.run_round(&local, inbound).await {
            Ok(block) => Ok(block),
            Err(e) => {
                tracing::warn!("Consensus round failed: {}", e);
                // A discarded, superseded or already appended block has moved the round on
                if !matches!(
                    e,
                    LedgerError::Consensus(ConsensusError::Signature(_) | ConsensusError::UnknownBlock(_))
                ) {
                    self.engine.abandon_round();
                }
                Err(e)
            }
        }
    }

    async fn run_round(
        &self,
        local: &LocalValidator,
        inbound: &mut mpsc::Receiver<ConsensusMessage>,
    ) -> Result<Block, LedgerError> {
        self.router.drain_all_into_pool();

        let tail = self.tail().ok_or(ValidationError::EmptyChain)?;
        let height = tail.index() + 1;
        let block = self.engine.propose_block(height, *tail.hash())?;
        let hash = *block.hash();
        let round = self.engine.live_round().unwrap_or_default();

        let proposal = Proposal::new(block, round, local.id.clone());
        let signature = self.engine.keys().sign(&proposal.signing_bytes(), &local.secret_key);
        let proposal = proposal.with_signature(signature);
        if let Err(e) = self.transport.broadcast_proposal(&proposal) {
            tracing::warn!("Failed to broadcast proposal: {}", e);
        }
        self.vote_locally(&hash, height, round);

        let deadline = tokio::time::Instant::now() + self.config.consensus.block_proposal_timeout;
        loop {
            match self.engine.phase_of(&hash) {
                Phase::Committed => break,
                Phase::Idle => return Err(ConsensusError::UnknownBlock(hash).into()),
                _ => {}
            }

            match tokio::time::timeout_at(deadline, inbound.recv()).await {
                Ok(Some(message)) => {
                    if let Err(e) = self.handle_message(message) {
                        tracing::debug!("Peer message rejected: {}", e);
                    }
                }
                Ok(None) => return Err(LedgerError::InboundClosed),
                Err(_) => return Err(ConsensusError::Timeout { height, round }.into()),
            }
        }

        let confirmed = self.engine.confirm_block(&hash)?;
        self.append(confirmed.clone())?;
        Ok(confirmed)
    }
}
