//! Round driver - periodic proposal loop
//!
//! Each tick drains shard queues into the pool, abandons a round that has
//! outlived the proposal timeout, and runs a full consensus round when this
//! node is the expected proposer. Between ticks it hands inbound peer
//! messages to the ledger so the node takes part in rounds other validators
//! lead.
//!
//! The driver is the only consumer of the inbound stream. Proposals, votes
//! and blocks from a peer are therefore applied in the order they arrived,
//! so a block is never looked at before the commit votes sent ahead of it.

use crate::ledger::Ledger;
use alsania_consensus::ConsensusMessage;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Default tick interval in milliseconds
pub const ROUND_INTERVAL_MS: u64 = 1_000;

#[derive(Clone, Debug)]
pub struct DriverConfig {
    pub round_interval_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            round_interval_ms: ROUND_INTERVAL_MS,
        }
    }
}

enum Wake {
    Tick,
    Message(Option<ConsensusMessage>),
}

pub struct RoundDriver {
    ledger: Arc<Ledger>,
    inbound: mpsc::Receiver<ConsensusMessage>,
    config: DriverConfig,
    /// Running flag
    running: Arc<AtomicBool>,
}

impl RoundDriver {
    pub fn new(ledger: Arc<Ledger>, inbound: mpsc::Receiver<ConsensusMessage>, config: DriverConfig) -> Self {
        Self {
            ledger,
            inbound,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag; storing `false` stops the loop after the current tick
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Run the driver (tokio)
    pub async fn run_async(mut self) {
        self.running.store(true, Ordering::SeqCst);

        let mut interval = tokio::time::interval(Duration::from_millis(self.config.round_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("Round driver started ({}ms ticks)", self.config.round_interval_ms);

        while self.running.load(Ordering::SeqCst) {
            let wake = tokio::select! {
                _ = interval.tick() => Wake::Tick,
                message = self.inbound.recv() => Wake::Message(message),
            };

            match wake {
                Wake::Tick => self.tick().await,
                Wake::Message(Some(message)) => {
                    if let Err(e) = self.ledger.handle_message(message) {
                        tracing::debug!("Peer message rejected: {}", e);
                    }
                }
                Wake::Message(None) => {
                    tracing::warn!("Inbound channel closed");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Round driver stopped at height {}", self.ledger.height());
    }

    async fn tick(&mut self) {
        self.ledger.router().drain_all_into_pool();

        if let Err(e) = self.ledger.engine().abandon_if_expired(Instant::now()) {
            tracing::warn!("{}", e);
        }

        if !self.ledger.should_propose() {
            return;
        }

        let started = Instant::now();
        if let Ok(block) = self.ledger.reach_consensus(&mut self.inbound).await {
            tracing::debug!(
                "Round for height {} finished in {:.2}ms",
                block.index(),
                started.elapsed().as_secs_f64() * 1000.0
            );
        }
    }
}
