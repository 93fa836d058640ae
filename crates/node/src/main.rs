//! Alsania Node
//!
//! Runs one member of a permissioned Alsania network: the peer transport,
//! the round driver and the HTTP JSON-RPC server around a sled-backed
//! ledger. Without a `local_validator` in the config the node only follows.

use alsania_chain::{ChainStore, ValidatorSet};
use alsania_consensus::{ConsensusMessage, Ed25519KeyRegistry, LedgerMutation, RewardHook, WsTransport};
use alsania_ledger::{driver::ROUND_INTERVAL_MS, BalanceBook, DriverConfig, Ledger, RoundDriver, StakeRewards};
use alsania_rpc::{HttpRpcServer, RpcContext};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::NodeConfig;

/// Capacity of the inbound peer message channel
const INBOUND_CAPACITY: usize = 4096;

/// Seconds between status lines
const STATUS_INTERVAL_SECS: u64 = 30;

/// Alsania permissioned proof-of-stake node
#[derive(Parser, Debug)]
#[command(name = "alsania-node")]
#[command(about = "Permissioned proof-of-stake ledger node", long_about = None)]
struct Args {
    /// JSON config listing shards, validators, peers and the local key
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP RPC bind address (overrides the config file)
    #[arg(long)]
    rpc_addr: Option<String>,

    /// Peer transport bind address (overrides the config file)
    #[arg(long)]
    p2p_addr: Option<String>,

    /// Additional peer to dial; may be repeated
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Round driver tick in milliseconds
    #[arg(long, default_value_t = ROUND_INTERVAL_MS)]
    round_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Data directory for the chain store
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => {
            tracing::warn!("No config file given; starting with an empty validator set");
            NodeConfig::default()
        }
    };
    if let Some(addr) = &args.rpc_addr {
        config.rpc_addr = addr.clone();
    }
    if let Some(addr) = &args.p2p_addr {
        config.p2p_addr = addr.clone();
    }
    config.peers.extend(args.peers.iter().cloned());

    run_node(args, config).await
}

async fn run_node(args: Args, config: NodeConfig) -> Result<()> {
    tracing::info!("Starting Alsania node");
    tracing::info!("  HTTP RPC: {}", config.rpc_addr);
    tracing::info!("  Peer transport: {}", config.p2p_addr);
    tracing::info!("  Peers: {:?}", config.peers);
    tracing::info!("  Round interval: {}ms", args.round_interval_ms);
    tracing::info!("  Data directory: {:?}", args.data_dir);
    match &config.local_validator {
        Some(local) => tracing::info!("  Validating as: {}", local.id),
        None => tracing::info!("  Following only (no local validator)"),
    }

    std::fs::create_dir_all(&args.data_dir)?;
    let store = ChainStore::open(args.data_dir.join("chain"))?;

    // Keys for every validator, plus accounts that sign their transfers
    let keys = Arc::new(Ed25519KeyRegistry::from_validators(&config.validators()));
    for account in &config.accounts {
        if let Some(key) = &account.public_key {
            keys.register(account.address.clone(), <[u8; 32]>::try_from(key.as_slice())?);
        }
    }

    let balances = BalanceBook::new();
    for account in config.accounts.iter().filter(|a| a.balance > 0) {
        balances.mint(&account.address, account.balance)?;
    }

    let rewards = if config.block_reward > 0 {
        let hook: Arc<dyn RewardHook> = Arc::new(StakeRewards::new(Arc::new(balances.clone()), config.block_reward));
        Some(hook)
    } else {
        None
    };

    let (inbound_tx, inbound_rx) = mpsc::channel::<ConsensusMessage>(INBOUND_CAPACITY);
    let transport = Arc::new(WsTransport::new(inbound_tx));
    transport.start(&config.p2p_addr).await?;

    // Shards fill the validator set
    let validators = Arc::new(ValidatorSet::new());
    let ledger = Ledger::new(config.ledger()?, validators, keys, transport.clone(), rewards).open(store)?;
    for shard in &config.shards {
        ledger.router().create_shard(shard.id, shard.validators.clone())?;
    }
    if ledger.is_empty() {
        ledger.create_genesis()?;
    }
    for peer in &config.peers {
        transport.connect_peer(peer);
        ledger.add_peer(peer.clone());
    }
    let ledger = Arc::new(ledger);

    tracing::info!(
        "Ledger ready at height {} with {} validators (total stake {})",
        ledger.height(),
        ledger.validators().len(),
        ledger.validators().total_stake()
    );

    // The driver consumes every inbound peer message, in arrival order
    let driver = RoundDriver::new(
        ledger.clone(),
        inbound_rx,
        DriverConfig {
            round_interval_ms: args.round_interval_ms,
        },
    );
    let running = driver.running_flag();
    let driver_handle = tokio::spawn(driver.run_async());

    // Start HTTP RPC server
    let rpc_context = Arc::new(RpcContext {
        ledger: ledger.clone(),
        balances: balances.clone(),
    });
    let rpc_addr = config.rpc_addr.clone();
    let http_server = tokio::spawn(async move {
        let server = HttpRpcServer::new(rpc_context);
        if let Err(e) = server.run(&rpc_addr).await {
            tracing::error!("HTTP RPC server error: {}", e);
        }
    });

    let status_ledger = ledger.clone();
    let status_transport = transport.clone();
    let status = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(STATUS_INTERVAL_SECS));
        interval.tick().await;
        loop {
            interval.tick().await;
            let consensus = status_ledger.engine().stats();
            let net = status_transport.stats();
            tracing::info!(
                "Height {}, round {}, pool {}: {} blocks confirmed, {} rounds abandoned, {} msgs out / {} in",
                status_ledger.height(),
                consensus.round,
                status_ledger.pool_size(),
                consensus.blocks_confirmed,
                consensus.rounds_abandoned,
                net.messages_sent,
                net.messages_received
            );
        }
    });

    tracing::info!("Alsania node running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    running.store(false, Ordering::SeqCst);

    if let Err(e) = ledger.flush() {
        tracing::error!("Failed to flush chain store: {}", e);
    } else {
        tracing::info!("Chain store flushed at height {}", ledger.height());
    }

    driver_handle.abort();
    http_server.abort();
    status.abort();

    tracing::info!("Node stopped");

    Ok(())
}
