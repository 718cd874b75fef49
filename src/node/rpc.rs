//! JSON-RPC HTTP server.
//!
//! Ethereum-compatible surface plus DAG-native methods, served from one
//! axum router with allow-all CORS and a `/health` probe. Block depth
//! stands in for Ethereum's block number throughout.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use super::node::{DevNode, NodeError};
use crate::dag::DagGraph;
use crate::types::block::Block;
use crate::types::transaction::{Receipt, ReceiptStatus, Transaction};
use crate::types::{keccak256, Address, Hash, U256};

/// RPC request envelope.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

/// RPC response envelope.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

/// RPC error object.
#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }
}

/// Standard JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// RPC server state.
#[derive(Clone)]
struct RpcState {
    node: Arc<DevNode>,
}

/// Bind and spawn the RPC HTTP server.
pub(crate) async fn start_rpc_server(
    node: Arc<DevNode>,
    addr: SocketAddr,
) -> Result<JoinHandle<()>, NodeError> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", post(handle_rpc))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(RpcState { node });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| NodeError::Bind { addr, source })?;
    info!("RPC server listening on {}", listener.local_addr().unwrap_or(addr));

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("RPC server error: {e}");
        }
    }))
}

async fn handle_health(State(state): State<RpcState>) -> Json<Value> {
    let blocks = state.node.dag().read().get_block_count();
    Json(json!({
        "status": "ok",
        "node": if state.node.is_running() { "running" } else { "stopped" },
        "blocks": blocks,
    }))
}

async fn handle_rpc(State(state): State<RpcState>, body: String) -> Json<RpcResponse> {
    let parsed: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => {
            return Json(RpcResponse::failure(
                Value::Null,
                RpcError::new(error_codes::PARSE_ERROR, "Parse error"),
            ))
        }
    };

    let request: RpcRequest = match serde_json::from_value(parsed) {
        Ok(r) => r,
        Err(_) => {
            return Json(RpcResponse::failure(
                Value::Null,
                RpcError::new(error_codes::INVALID_REQUEST, "Invalid Request"),
            ))
        }
    };

    let id = request.id.unwrap_or(Value::Null);
    if request.jsonrpc != "2.0" {
        return Json(RpcResponse::failure(
            id,
            RpcError::new(error_codes::INVALID_REQUEST, "Invalid Request"),
        ));
    }

    let params = params_array(request.params.unwrap_or(Value::Null));
    match dispatch(&state.node, &request.method, &params).await {
        Ok(result) => Json(RpcResponse::success(id, result)),
        Err(error) => Json(RpcResponse::failure(id, error)),
    }
}

/// Route a method name to its handler.
async fn dispatch(node: &Arc<DevNode>, method: &str, params: &[Value]) -> Result<Value, RpcError> {
    match method {
        // === Ethereum-compatible methods ===
        "eth_chainId" => Ok(json!(hex_quantity(node.chain_id()))),
        "eth_blockNumber" => Ok(json!(hex_quantity(node.dag().read().get_max_depth()))),
        "eth_gasPrice" => Ok(json!(hex_quantity(1_000_000_000))),
        "eth_accounts" => Ok(json!(node.dev_accounts())),
        "eth_getBalance" => eth_get_balance(node, params),
        "eth_getTransactionCount" => eth_get_transaction_count(node, params),
        "eth_getCode" => eth_get_code(node, params),
        "eth_getStorageAt" => eth_get_storage_at(node, params),
        "eth_getBlockByHash" => eth_get_block_by_hash(node, params),
        "eth_getBlockByNumber" => eth_get_block_by_number(node, params),
        "eth_sendTransaction" | "eth_sendRawTransaction" => eth_send_transaction(node, params),
        "eth_call" => eth_call(node, params),
        "eth_estimateGas" => eth_estimate_gas(node, params),
        "eth_getTransactionReceipt" => eth_get_transaction_receipt(node, params),
        "eth_getLogs" => eth_get_logs(node, params),

        // === DAG-native methods ===
        "dag_getDAGInfo" => Ok(dag_info(node)),
        "dag_getStats" => Ok(dag_stats(node)),
        "dag_getBlockByHash" => dag_get_block_by_hash(node, params),
        "dag_sendTransaction" => eth_send_transaction(node, params),
        "dag_getBlueSet" => Ok(dag_blue_set(node)),
        "dag_getRedSet" => Ok(dag_red_set(node)),
        "dag_getTips" => Ok(dag_tips(node)),
        "dag_getBlockParents" => dag_block_parents(node, params),
        "dag_getBlockChildren" => dag_block_children(node, params),
        "dag_getAnticone" => dag_anticone(node, params),
        "dag_getBlueScore" => dag_blue_score(node, params),
        "dag_mineBlocks" => dag_mine_blocks(node, params).await,

        // === Network methods ===
        "net_version" => Ok(json!(node.chain_id().to_string())),
        "net_listening" => Ok(json!(true)),
        "net_peerCount" => Ok(json!("0x0")),

        // === Web3 methods ===
        "web3_clientVersion" => Ok(json!(format!("braidnode/v{}", env!("CARGO_PKG_VERSION")))),
        "web3_sha3" => web3_sha3(params),

        _ => Err(RpcError::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )),
    }
}

// === Ethereum-compatible implementations ===

fn eth_get_balance(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let address = parse_address(require(params, 0)?)?;
    Ok(json!(node.executor().read().get_balance(&address).to_hex_string()))
}

fn eth_get_transaction_count(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let address = parse_address(require(params, 0)?)?;
    Ok(json!(hex_quantity(node.executor().read().get_nonce(&address))))
}

fn eth_get_code(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let address = parse_address(require(params, 0)?)?;
    Ok(json!(hex_data(&node.executor().read().get_code(&address))))
}

fn eth_get_storage_at(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let address = parse_address(require(params, 0)?)?;
    let slot = parse_u256(require(params, 1)?)?;
    let value = node.executor().read().get_storage_at(&address, &slot);
    Ok(json!(hex_data(&value.to_be_bytes())))
}

fn eth_get_block_by_hash(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let hash = parse_hash(require(params, 0)?)?;
    let full = params.get(1).and_then(Value::as_bool).unwrap_or(false);
    let dag = node.dag().read();
    Ok(dag
        .get_block(&hash)
        .map(|b| block_view(b, full))
        .unwrap_or(Value::Null))
}

fn eth_get_block_by_number(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let dag = node.dag().read();
    let depth = resolve_depth(&dag, require(params, 0)?)?;
    let full = params.get(1).and_then(Value::as_bool).unwrap_or(false);
    Ok(block_at_depth(&dag, depth)
        .map(|b| block_view(b, full))
        .unwrap_or(Value::Null))
}

fn eth_send_transaction(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let spec: TxSpec = parse_spec(require(params, 0)?)?;
    let tx = build_transaction(node, spec)?;
    let hash = node
        .add_transaction(tx)
        .map_err(|e| RpcError::invalid_params(e.to_string()))?;
    Ok(json!(hash))
}

fn eth_call(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let spec: TxSpec = parse_spec(require(params, 0)?)?;
    let to = spec
        .to
        .as_deref()
        .ok_or_else(|| RpcError::invalid_params("call requires 'to'"))?;
    let to = Address::from_hex(to).map_err(|e| RpcError::invalid_params(e.to_string()))?;
    let from = parse_optional_address(spec.from.as_deref())?;
    let value = parse_optional_u256(spec.value.as_deref())?;
    let data = parse_optional_data(spec.data.as_deref().or(spec.input.as_deref()))?;

    node.executor()
        .write()
        .call(to, &data, from, value)
        .map(|output| json!(hex_data(&output)))
        .map_err(|e| RpcError::internal(e.to_string()))
}

fn eth_estimate_gas(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let spec: TxSpec = parse_spec(require(params, 0)?)?;
    let tx = build_transaction(node, spec)?;
    node.executor()
        .write()
        .estimate_gas(&tx)
        .map(|gas| json!(hex_quantity(gas)))
        .map_err(|e| RpcError::internal(e.to_string()))
}

fn eth_get_transaction_receipt(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let hash = parse_hash(require(params, 0)?)?;
    Ok(node
        .miner()
        .get_receipt(&hash)
        .map(|r| receipt_view(&r))
        .unwrap_or(Value::Null))
}

/// Log query filter, Ethereum wallet style.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LogFilter {
    from_block: Option<Value>,
    to_block: Option<Value>,
    address: Option<Value>,
    topics: Option<Vec<Option<Value>>>,
}

fn eth_get_logs(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let filter: LogFilter = match params.first() {
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| RpcError::invalid_params(format!("bad log filter: {e}")))?,
        None => LogFilter::default(),
    };

    let dag = node.dag().read();
    let from = filter
        .from_block
        .as_ref()
        .map(|v| resolve_depth(&dag, v))
        .transpose()?
        .unwrap_or(0);
    let to = filter
        .to_block
        .as_ref()
        .map(|v| resolve_depth(&dag, v))
        .transpose()?
        .unwrap_or(dag.get_max_depth());

    let addresses: Option<Vec<Address>> = match &filter.address {
        None => None,
        Some(Value::String(s)) => Some(vec![
            Address::from_hex(s).map_err(|e| RpcError::invalid_params(e.to_string()))?
        ]),
        Some(Value::Array(list)) => Some(
            list.iter()
                .map(parse_address)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(_) => return Err(RpcError::invalid_params("bad address filter")),
    };

    let topic_filters: Vec<Option<Vec<Hash>>> = match &filter.topics {
        None => Vec::new(),
        Some(positions) => positions
            .iter()
            .map(|position| match position {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => {
                    Hash::from_hex(s)
                        .map(|h| Some(vec![h]))
                        .map_err(|e| RpcError::invalid_params(e.to_string()))
                }
                Some(Value::Array(options)) => options
                    .iter()
                    .map(parse_hash)
                    .collect::<Result<Vec<_>, _>>()
                    .map(Some),
                Some(_) => Err(RpcError::invalid_params("bad topic filter")),
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    let mut out = Vec::new();
    for receipt in node.miner().get_all_receipts() {
        let Some(block) = dag.get_block(&receipt.block_hash) else {
            continue;
        };
        if block.dag_depth < from || block.dag_depth > to {
            continue;
        }
        for (log_index, log) in receipt.logs.iter().enumerate() {
            if let Some(addrs) = &addresses {
                if !addrs.contains(&log.address) {
                    continue;
                }
            }
            let topics_match = topic_filters.iter().enumerate().all(|(i, allowed)| {
                match allowed {
                    None => true,
                    Some(options) => log
                        .topics
                        .get(i)
                        .map(|topic| options.contains(topic))
                        .unwrap_or(false),
                }
            });
            if !topics_match {
                continue;
            }
            out.push(json!({
                "address": log.address,
                "topics": log.topics,
                "data": hex_data(&log.data),
                "blockHash": receipt.block_hash,
                "blockNumber": hex_quantity(block.dag_depth),
                "transactionHash": receipt.transaction_hash,
                "logIndex": hex_quantity(log_index as u64),
                "removed": false,
            }));
        }
    }
    Ok(json!(out))
}

// === DAG-native implementations ===

fn dag_info(node: &DevNode) -> Value {
    let dag = node.dag().read();
    let mining = node.miner().config();
    json!({
        "genesisHash": dag.get_genesis_hash(),
        "blockCount": dag.get_block_count(),
        "maxDepth": dag.get_max_depth(),
        "tips": dag.get_tips(),
        "chainId": node.chain_id(),
        "k": node.config().ghostdag.k,
        "blueThreshold": node.config().ghostdag.blue_threshold,
        "parallelism": mining.parallelism,
        "blockTimeMs": mining.block_time_ms,
        "maxParents": mining.max_parents,
    })
}

fn dag_stats(node: &DevNode) -> Value {
    let stats = node.dag().read().get_stats();
    let mut value = serde_json::to_value(&stats).expect("stats serialize");
    value["mempoolSize"] = json!(node.mempool().size());
    value
}

fn dag_get_block_by_hash(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let hash = parse_hash(require(params, 0)?)?;
    let dag = node.dag().read();
    Ok(dag
        .get_block(&hash)
        .map(|b| block_view(b, false))
        .unwrap_or(Value::Null))
}

fn dag_blue_set(node: &DevNode) -> Value {
    let dag = node.dag().read();
    json!(dag.get_blue_blocks().iter().map(|b| summary_view(b)).collect::<Vec<_>>())
}

fn dag_red_set(node: &DevNode) -> Value {
    let dag = node.dag().read();
    json!(dag.get_red_blocks().iter().map(|b| summary_view(b)).collect::<Vec<_>>())
}

fn dag_tips(node: &DevNode) -> Value {
    let dag = node.dag().read();
    let tips: Vec<Value> = dag
        .get_tips()
        .iter()
        .filter_map(|h| dag.get_block(h))
        .map(summary_view)
        .collect();
    json!(tips)
}

fn dag_block_parents(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let hash = parse_hash(require(params, 0)?)?;
    let dag = node.dag().read();
    let Some(block) = dag.get_block(&hash) else {
        return Ok(Value::Null);
    };
    let parents: Vec<Value> = block
        .parent_hashes
        .iter()
        .filter_map(|h| dag.get_block(h))
        .map(summary_view)
        .collect();
    Ok(json!(parents))
}

fn dag_block_children(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let hash = parse_hash(require(params, 0)?)?;
    let dag = node.dag().read();
    let Some(children) = dag.get_children(&hash) else {
        return Ok(Value::Null);
    };
    let views: Vec<Value> = children
        .iter()
        .filter_map(|h| dag.get_block(h))
        .map(summary_view)
        .collect();
    Ok(json!(views))
}

fn dag_anticone(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let hash = parse_hash(require(params, 0)?)?;
    let dag = node.dag().read();
    let Some(anticone) = dag.anticone(&hash) else {
        return Ok(Value::Null);
    };
    let views: Vec<Value> = anticone
        .iter()
        .filter_map(|h| dag.get_block(h))
        .map(summary_view)
        .collect();
    Ok(json!(views))
}

fn dag_blue_score(node: &DevNode, params: &[Value]) -> Result<Value, RpcError> {
    let hash = parse_hash(require(params, 0)?)?;
    let dag = node.dag().read();
    Ok(dag
        .get_block(&hash)
        .map(|b| json!(b.blue_score))
        .unwrap_or(Value::Null))
}

async fn dag_mine_blocks(node: &Arc<DevNode>, params: &[Value]) -> Result<Value, RpcError> {
    let count = params
        .first()
        .map(parse_quantity)
        .transpose()?
        .unwrap_or(1) as usize;
    if count == 0 || count > 1000 {
        return Err(RpcError::invalid_params("count must be in 1..=1000"));
    }
    let mined = node.mine_blocks(count).await;
    Ok(json!({
        "mined": mined.len(),
        "blocks": mined,
    }))
}

// === Web3 implementations ===

fn web3_sha3(params: &[Value]) -> Result<Value, RpcError> {
    let data = require(params, 0)?
        .as_str()
        .ok_or_else(|| RpcError::invalid_params("expected hex string"))?;
    let bytes =
        hex::decode(data.trim_start_matches("0x")).map_err(|_| RpcError::invalid_params("invalid hex"))?;
    Ok(json!(hex_data(&keccak256(&bytes))))
}

// === Wire views ===

fn block_view(block: &Block, full_txs: bool) -> Value {
    let transactions: Value = if full_txs {
        json!(block.transactions.iter().map(tx_view).collect::<Vec<_>>())
    } else {
        json!(block.transactions.iter().map(|t| t.hash).collect::<Vec<_>>())
    };
    json!({
        "hash": block.hash,
        "number": hex_quantity(block.dag_depth),
        "parentHash": block
            .parent_hashes
            .first()
            .map(|h| h.to_hex())
            .unwrap_or_else(|| "0x0".to_string()),
        "parentHashes": block.parent_hashes,
        "timestamp": hex_quantity(block.timestamp),
        "miner": block.miner,
        "difficulty": hex_quantity(block.difficulty),
        "transactions": transactions,
        "transactionsRoot": block.transactions_root,
        "stateRoot": block.state_root,
        "nonce": hex_quantity(block.nonce),
        "color": block.color,
        "dagDepth": block.dag_depth,
        "blueScore": block.blue_score,
    })
}

fn tx_view(tx: &Transaction) -> Value {
    json!({
        "hash": tx.hash,
        "from": tx.from,
        "to": tx.to,
        "value": tx.value,
        "input": hex_data(&tx.data),
        "nonce": hex_quantity(tx.nonce),
        "gas": hex_quantity(tx.gas_limit),
        "gasPrice": tx.gas_price,
    })
}

fn receipt_view(receipt: &Receipt) -> Value {
    json!({
        "transactionHash": receipt.transaction_hash,
        "blockHash": receipt.block_hash,
        "from": receipt.from,
        "to": receipt.to,
        "gasUsed": hex_quantity(receipt.gas_used),
        "cumulativeGasUsed": hex_quantity(receipt.cumulative_gas_used),
        "status": match receipt.status {
            ReceiptStatus::Success => "0x1",
            ReceiptStatus::Failed => "0x0",
        },
        "logs": receipt.logs,
        "contractAddress": receipt.contract_address,
    })
}

fn summary_view(block: &Block) -> Value {
    json!({
        "hash": block.hash,
        "dagDepth": block.dag_depth,
        "color": block.color,
        "blueScore": block.blue_score,
    })
}

// === Transaction specs ===

/// Caller-supplied transaction fields, Ethereum wallet style.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TxSpec {
    from: Option<String>,
    to: Option<String>,
    value: Option<String>,
    data: Option<String>,
    input: Option<String>,
    nonce: Option<String>,
    gas: Option<String>,
    gas_price: Option<String>,
}

fn parse_spec(value: &Value) -> Result<TxSpec, RpcError> {
    serde_json::from_value(value.clone())
        .map_err(|e| RpcError::invalid_params(format!("bad transaction spec: {e}")))
}

/// Materialize a spec into a transaction, filling dev-node defaults:
/// first dev account as sender, current state nonce, 1 gwei gas price.
fn build_transaction(node: &DevNode, spec: TxSpec) -> Result<Transaction, RpcError> {
    let from = match spec.from.as_deref() {
        Some(s) => Address::from_hex(s).map_err(|e| RpcError::invalid_params(e.to_string()))?,
        None => *node
            .dev_accounts()
            .first()
            .ok_or_else(|| RpcError::invalid_params("no default account available"))?,
    };
    let to = match spec.to.as_deref() {
        Some(s) => Some(Address::from_hex(s).map_err(|e| RpcError::invalid_params(e.to_string()))?),
        None => None,
    };
    let value = parse_optional_u256(spec.value.as_deref())?.unwrap_or(U256::ZERO);
    let data = parse_optional_data(spec.data.as_deref().or(spec.input.as_deref()))?;
    let nonce = match spec.nonce.as_deref() {
        Some(s) => parse_hex_u64(s)?,
        None => node.executor().read().get_nonce(&from),
    };
    let gas_limit = match spec.gas.as_deref() {
        Some(s) => parse_hex_u64(s)?,
        None => 1_000_000,
    };
    let gas_price =
        parse_optional_u256(spec.gas_price.as_deref())?.unwrap_or(U256::from_u64(1_000_000_000));

    Ok(Transaction::new(from, to, value, data, nonce, gas_limit, gas_price))
}

// === Param helpers ===

fn params_array(params: Value) -> Vec<Value> {
    match params {
        Value::Array(list) => list,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn require(params: &[Value], index: usize) -> Result<&Value, RpcError> {
    params
        .get(index)
        .ok_or_else(|| RpcError::invalid_params(format!("missing parameter {index}")))
}

fn parse_address(value: &Value) -> Result<Address, RpcError> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcError::invalid_params("expected address string"))?;
    Address::from_hex(s).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn parse_hash(value: &Value) -> Result<Hash, RpcError> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcError::invalid_params("expected hash string"))?;
    Hash::from_hex(s).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn parse_u256(value: &Value) -> Result<U256, RpcError> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcError::invalid_params("expected hex quantity"))?;
    U256::from_hex_str(s).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn parse_quantity(value: &Value) -> Result<u64, RpcError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| RpcError::invalid_params("expected unsigned integer")),
        Value::String(s) => parse_hex_u64(s),
        _ => Err(RpcError::invalid_params("expected quantity")),
    }
}

fn parse_hex_u64(s: &str) -> Result<u64, RpcError> {
    let trimmed = s.trim_start_matches("0x");
    u64::from_str_radix(trimmed, 16)
        .or_else(|_| s.parse::<u64>())
        .map_err(|_| RpcError::invalid_params(format!("bad quantity: {s}")))
}

fn parse_optional_address(s: Option<&str>) -> Result<Option<Address>, RpcError> {
    s.map(|s| Address::from_hex(s).map_err(|e| RpcError::invalid_params(e.to_string())))
        .transpose()
}

fn parse_optional_u256(s: Option<&str>) -> Result<Option<U256>, RpcError> {
    s.map(|s| U256::from_hex_str(s).map_err(|e| RpcError::invalid_params(e.to_string())))
        .transpose()
}

fn parse_optional_data(s: Option<&str>) -> Result<Vec<u8>, RpcError> {
    match s {
        Some(s) => hex::decode(s.trim_start_matches("0x"))
            .map_err(|_| RpcError::invalid_params("invalid hex data")),
        None => Ok(Vec::new()),
    }
}

fn hex_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Translate a depth parameter: `latest`/`pending` map to the DAG's max
/// depth, `earliest` to zero, quantities pass through.
fn resolve_depth(dag: &DagGraph, value: &Value) -> Result<u64, RpcError> {
    match value {
        Value::String(s) => match s.as_str() {
            "latest" | "pending" => Ok(dag.get_max_depth()),
            "earliest" => Ok(0),
            other => parse_hex_u64(other),
        },
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| RpcError::invalid_params("expected depth")),
        _ => Err(RpcError::invalid_params("expected depth or tag")),
    }
}

/// Deterministic representative for a depth with several blocks: blue
/// before red, then lowest hash.
fn block_at_depth<'a>(dag: &'a DagGraph, depth: u64) -> Option<&'a Block> {
    dag.get_all_blocks()
        .into_iter()
        .filter(|b| b.dag_depth == depth)
        .min_by_key(|b| (!b.is_blue(), b.hash))
}
