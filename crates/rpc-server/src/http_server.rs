//! HTTP JSON-RPC Server
//!
//! Provides HTTP endpoint for JSON-RPC methods.

use crate::methods::{
    handle_get_balance, handle_get_block, handle_get_chain_height, handle_get_chain_info,
    handle_get_consensus_stats, handle_get_health, handle_get_pool_size, handle_submit_block,
    handle_submit_transaction, RpcContext, RpcError, SubmitTransactionRequest,
};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// HTTP RPC Server
pub struct HttpRpcServer {
    context: Arc<RpcContext>,
}

impl HttpRpcServer {
    /// Create a new HTTP RPC server
    pub fn new(context: Arc<RpcContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/", post(handle_rpc))
            .layer(cors)
            .with_state(self.context)
    }

    /// Run the server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP RPC server listening on {}", addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Handle JSON-RPC request
async fn handle_rpc(
    State(context): State<Arc<RpcContext>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    (StatusCode::OK, Json(respond(&context, request)))
}

fn respond(ctx: &RpcContext, request: JsonRpcRequest) -> JsonRpcResponse {
    match dispatch_method(ctx, &request.method, request.params) {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(e) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: None,
            error: Some(JsonRpcError {
                code: error_code(&e),
                message: e.to_string(),
            }),
        },
    }
}

fn positional(params: Value) -> Vec<Value> {
    serde_json::from_value(params).unwrap_or_default()
}

fn to_json<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::InternalError(e.to_string()))
}

/// Dispatch to appropriate method handler
fn dispatch_method(ctx: &RpcContext, method: &str, params: Value) -> Result<Value, RpcError> {
    tracing::debug!("RPC method called: {}", method);
    match method {
        "submitTransaction" => {
            let params = positional(params);
            let shard_id = params
                .first()
                .and_then(Value::as_u64)
                .and_then(|id| u32::try_from(id).ok())
                .ok_or_else(|| RpcError::InvalidParams("Missing shard id".to_string()))?;
            let transaction = params
                .get(1)
                .cloned()
                .ok_or_else(|| RpcError::InvalidParams("Missing transaction".to_string()))?;
            let transaction = serde_json::from_value(transaction)
                .map_err(|e| RpcError::InvalidParams(format!("Invalid transaction: {}", e)))?;

            let response = handle_submit_transaction(ctx, SubmitTransactionRequest { shard_id, transaction })?;
            to_json(response)
        }

        "submitBlock" => {
            let params = positional(params);
            let encoded = params
                .first()
                .and_then(|v| v.as_str())
                .ok_or_else(|| RpcError::InvalidParams("Missing block".to_string()))?;

            to_json(handle_submit_block(ctx, encoded)?)
        }

        "getChainHeight" => Ok(json!(handle_get_chain_height(ctx)?)),

        "getBlock" => {
            let index = positional(params)
                .first()
                .and_then(Value::as_u64)
                .ok_or_else(|| RpcError::InvalidParams("Missing block index".to_string()))?;

            to_json(handle_get_block(ctx, index)?)
        }

        "getPoolSize" => Ok(json!(handle_get_pool_size(ctx)?)),

        "getBalance" => {
            let params = positional(params);
            let address = params
                .first()
                .and_then(|v| v.as_str())
                .ok_or_else(|| RpcError::InvalidParams("Missing address".to_string()))?;

            Ok(json!(handle_get_balance(ctx, address)?))
        }

        "getChainInfo" => to_json(handle_get_chain_info(ctx)?),

        "getConsensusStats" => to_json(handle_get_consensus_stats(ctx)?),

        "getHealth" => Ok(json!(handle_get_health(ctx)?)),

        "getVersion" => Ok(json!({
            "alsania-core": env!("CARGO_PKG_VERSION"),
        })),

        _ => Err(RpcError::MethodNotFound(method.to_string())),
    }
}

/// Map error to JSON-RPC error code
fn error_code(error: &RpcError) -> i32 {
    match error {
        RpcError::InvalidParams(_) => -32602,
        RpcError::MethodNotFound(_) => -32601,
        RpcError::InternalError(_) => -32603,
        RpcError::Rejected(_) => -32000,
    }
}
