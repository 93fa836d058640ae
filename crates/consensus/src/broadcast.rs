//! WebSocket transport between validators
//!
//! Every node listens for inbound peer connections and dials each configured
//! peer for outbound traffic. Outbound sends are pushed onto a bounded
//! per-peer queue drained by a reconnecting link task, so callers never wait
//! on the network.

use crate::error::TransportError;
use crate::interfaces::Transport;
use crate::types::{ConsensusMessage, Proposal, Vote};
use alsania_chain::Block;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message};

/// Messages buffered per peer while its link is down
const PEER_QUEUE_CAPACITY: usize = 1024;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TransportStats {
    pub inbound_connections: usize,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,
}

/// Peer-to-peer transport over WebSocket binary frames carrying borsh
/// encoded [`ConsensusMessage`]s
pub struct WsTransport {
    /// Outbound queues by peer address
    peers: DashMap<String, mpsc::Sender<Vec<u8>>>,
    /// Decoded inbound messages
    inbound: mpsc::Sender<ConsensusMessage>,
    stats: Arc<RwLock<TransportStats>>,
}

impl WsTransport {
    /// Create a transport delivering decoded inbound messages to `inbound`
    pub fn new(inbound: mpsc::Sender<ConsensusMessage>) -> Self {
        Self {
            peers: DashMap::new(),
            inbound,
            stats: Arc::new(RwLock::new(TransportStats::default())),
        }
    }

    /// Start listening for peer connections
    pub async fn start(&self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Peer transport listening on {}", addr);

        let inbound = self.inbound.clone();
        let stats = self.stats.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        tracing::info!("Peer connected from {}", peer_addr);
                        let inbound = inbound.clone();
                        let stats = stats.clone();

                        tokio::spawn(async move {
                            if let Err(e) = handle_peer_connection(stream, peer_addr, inbound, stats).await {
                                tracing::warn!("Peer connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    }
                }
            }
        });

        Ok(())
    }

    /// Dial `addr` and keep the link up; must be called inside a tokio runtime
    pub fn connect_peer(&self, addr: &str) {
        if self.peers.contains_key(addr) {
            return;
        }
        let (tx, rx) = mpsc::channel(PEER_QUEUE_CAPACITY);
        self.peers.insert(addr.to_string(), tx);
        tokio::spawn(run_peer_link(addr.to_string(), rx, self.stats.clone()));
    }

    pub fn peer_addrs(&self) -> Vec<String> {
        self.peers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn stats(&self) -> TransportStats {
        self.stats.read().clone()
    }

    fn enqueue(&self, peer: &str, queue: &mpsc::Sender<Vec<u8>>, data: Vec<u8>) -> Result<(), TransportError> {
        match queue.try_send(data) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.write().messages_dropped += 1;
                Err(TransportError::QueueFull(peer.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed(peer.to_string())),
        }
    }

    /// Queue `msg` for every peer; reports the first failure after trying all
    fn broadcast(&self, msg: &ConsensusMessage) -> Result<(), TransportError> {
        let data = msg.to_bytes();
        let mut first_error = None;
        for entry in self.peers.iter() {
            if let Err(e) = self.enqueue(entry.key(), entry.value(), data.clone()) {
                tracing::warn!("Broadcast to {} failed: {}", entry.key(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Transport for WsTransport {
    fn send_block(&self, peer: &str, block: &Block) -> Result<(), TransportError> {
        let queue = self
            .peers
            .get(peer)
            .ok_or_else(|| TransportError::UnknownPeer(peer.to_string()))?;
        let data = ConsensusMessage::Block(block.clone()).to_bytes();
        self.enqueue(peer, queue.value(), data)
    }

    fn broadcast_proposal(&self, proposal: &Proposal) -> Result<(), TransportError> {
        self.broadcast(&ConsensusMessage::Proposal(proposal.clone()))
    }

    fn broadcast_vote(&self, vote: &Vote) -> Result<(), TransportError> {
        self.broadcast(&ConsensusMessage::Vote(vote.clone()))
    }
}

async fn handle_peer_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    inbound: mpsc::Sender<ConsensusMessage>,
    stats: Arc<RwLock<TransportStats>>,
) -> anyhow::Result<()> {
    let mut ws_stream = accept_async(stream).await?;
    stats.write().inbound_connections += 1;

    while let Some(msg) = ws_stream.next().await {
        match msg {
            Ok(Message::Binary(data)) => match ConsensusMessage::from_bytes(&data) {
                Ok(message) => {
                    stats.write().messages_received += 1;
                    if inbound.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Undecodable message from {}: {}", peer_addr, e);
                }
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket error from {}: {}", peer_addr, e);
                break;
            }
            _ => {}
        }
    }

    stats.write().inbound_connections -= 1;
    tracing::info!("Peer {} disconnected", peer_addr);

    Ok(())
}

/// Forward queued frames to `addr`, reconnecting on failure. A frame that
/// failed to send is retried on the next connection.
async fn run_peer_link(addr: String, mut rx: mpsc::Receiver<Vec<u8>>, stats: Arc<RwLock<TransportStats>>) {
    let url = format!("ws://{}", addr);
    let mut pending: Option<Vec<u8>> = None;

    loop {
        let ws_stream = match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                tracing::debug!("Peer {} unreachable: {}", addr, e);
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };
        tracing::info!("Connected to peer {}", addr);
        let (mut ws_sender, _ws_receiver) = ws_stream.split();

        loop {
            let data = match pending.take() {
                Some(data) => data,
                None => match rx.recv().await {
                    Some(data) => data,
                    None => return,
                },
            };

            if let Err(e) = ws_sender.send(Message::Binary(data.clone())).await {
                tracing::warn!("Send to peer {} failed: {}", addr, e);
                pending = Some(data);
                break;
            }
            stats.write().messages_sent += 1;
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
