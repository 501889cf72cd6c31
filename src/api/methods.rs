//! Status method implementations
//!
//! Each method answers one JSON-RPC call about the withdrawal ledger.

use crate::crypto::Hash;
use crate::pax::Ledger;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Value,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC Error
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

/// Handler state
pub struct ApiState {
    pub ledger: Arc<Ledger>,
    pub reference: String,
    /// Symbols of the scanned chains
    pub chains: Vec<String>,
}

/// Process a JSON-RPC request and return a response
pub fn handle_request(state: &ApiState, request: JsonRpcRequest) -> JsonRpcResponse {
    match request.method.as_str() {
        "paxtotal" => pax_total(state, request.id),
        "paxfind" => pax_find(state, request.id, request.params),
        "paxpending" => pax_pending(state, request.id),
        "getinfo" => get_info(state, request.id),
        _ => JsonRpcResponse::error(
            request.id,
            -32601,
            format!("Method not found: {}", request.method),
        ),
    }
}

/// Sum of unmarked withdrawal amounts
fn pax_total(state: &ApiState, id: Value) -> JsonRpcResponse {
    JsonRpcResponse::success(id, json!(state.ledger.total_pending()))
}

/// Withdrawal record by txid
fn pax_find(state: &ApiState, id: Value, params: Option<Value>) -> JsonRpcResponse {
    let txid = match params {
        Some(Value::Array(arr)) if !arr.is_empty() => arr[0].as_str().unwrap_or("").to_string(),
        Some(Value::String(s)) => s,
        _ => return JsonRpcResponse::error(id, -32602, "Invalid params: expected txid".into()),
    };
    let txid = match Hash::from_hex(&txid) {
        Ok(h) => h,
        Err(_) => return JsonRpcResponse::error(id, -8, "Invalid txid".into()),
    };

    match state.ledger.find(&txid) {
        Some(record) => match serde_json::to_value(record) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, -32603, e.to_string()),
        },
        None => JsonRpcResponse::error(id, -5, "Withdrawal not found".into()),
    }
}

/// All unmarked withdrawals
fn pax_pending(state: &ApiState, id: Value) -> JsonRpcResponse {
    let mut pending = state.ledger.pending();
    pending.sort_by_key(|r| (r.foreign_height, r.txid));
    match serde_json::to_value(pending) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, -32603, e.to_string()),
    }
}

fn get_info(state: &ApiState, id: Value) -> JsonRpcResponse {
    JsonRpcResponse::success(
        id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "reference": state.reference,
            "chains": state.chains,
            "records": state.ledger.len(),
            "pending": state.ledger.total_pending(),
        }),
    )
}
