//! RPC Methods - JSON-RPC method handlers

use alsania_chain::{Block, ShardId, Transaction};
use alsania_consensus::{ConsensusStats, LedgerMutation};
use alsania_ledger::{BalanceBook, Ledger, LedgerError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// RPC context shared across handlers
pub struct RpcContext {
    pub ledger: Arc<Ledger>,
    pub balances: BalanceBook,
}

// ============ Request/Response Types ============

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTransactionRequest {
    #[serde(rename = "shardId")]
    pub shard_id: ShardId,
    pub transaction: Transaction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTransactionResponse {
    pub id: String,
    #[serde(rename = "shardId")]
    pub shard_id: ShardId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitBlockResponse {
    pub height: u64,
    pub hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChainInfo {
    pub height: u64,
    #[serde(rename = "tipHash")]
    pub tip_hash: Option<String>,
    #[serde(rename = "poolSize")]
    pub pool_size: usize,
    pub validators: usize,
    #[serde(rename = "totalStake")]
    pub total_stake: u64,
}

// ============ RPC Handlers ============

/// Handle submitTransaction RPC method
pub fn handle_submit_transaction(
    ctx: &RpcContext,
    params: SubmitTransactionRequest,
) -> Result<SubmitTransactionResponse, RpcError> {
    let id = ctx.ledger.submit_transaction(params.shard_id, params.transaction)?;
    Ok(SubmitTransactionResponse {
        id: id.to_hex(),
        shard_id: params.shard_id,
    })
}

/// Handle submitBlock RPC method (base64 borsh block)
pub fn handle_submit_block(ctx: &RpcContext, encoded: &str) -> Result<SubmitBlockResponse, RpcError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| RpcError::InvalidParams("Invalid base64 encoding".to_string()))?;
    let hash = Block::from_bytes(&bytes)
        .map(|b| b.hash().to_hex())
        .map_err(|_| RpcError::InvalidParams("Invalid block format".to_string()))?;

    let height = ctx.ledger.submit_peer_block(&bytes)?;
    Ok(SubmitBlockResponse { height, hash })
}

pub fn handle_get_chain_height(ctx: &RpcContext) -> Result<u64, RpcError> {
    Ok(ctx.ledger.height())
}

pub fn handle_get_block(ctx: &RpcContext, index: u64) -> Result<Option<Block>, RpcError> {
    Ok(ctx.ledger.block(index))
}

pub fn handle_get_pool_size(ctx: &RpcContext) -> Result<usize, RpcError> {
    Ok(ctx.ledger.pool_size())
}

pub fn handle_get_balance(ctx: &RpcContext, address: &str) -> Result<u64, RpcError> {
    Ok(ctx.balances.get_balance(address))
}

pub fn handle_get_chain_info(ctx: &RpcContext) -> Result<ChainInfo, RpcError> {
    let validators = ctx.ledger.validators();
    Ok(ChainInfo {
        height: ctx.ledger.height(),
        tip_hash: ctx.ledger.tail().map(|b| b.hash().to_hex()),
        pool_size: ctx.ledger.pool_size(),
        validators: validators.len(),
        total_stake: validators.total_stake(),
    })
}

pub fn handle_get_consensus_stats(ctx: &RpcContext) -> Result<ConsensusStats, RpcError> {
    Ok(ctx.ledger.engine().stats())
}

/// Handle getHealth RPC method
pub fn handle_get_health(ctx: &RpcContext) -> Result<String, RpcError> {
    if ctx.ledger.is_empty() {
        return Err(RpcError::InternalError("Chain has no genesis block".to_string()));
    }
    Ok("ok".to_string())
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl From<LedgerError> for RpcError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Store(e) => RpcError::InternalError(e.to_string()),
            other => RpcError::Rejected(other.to_string()),
        }
    }
}
