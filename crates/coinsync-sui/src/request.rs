//! JSON-RPC 2.0 request and response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// Error object returned by the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result` / `error` is set by a
/// well-behaved node.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Unwrap into the result payload or the node's error object.
    ///
    /// A response carrying neither is treated as a `null` result.
    pub fn into_result(self) -> Result<Value, TransportError> {
        match self.error {
            Some(err) => Err(TransportError::Rpc(err)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
