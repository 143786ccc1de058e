//! Transport-level error types.

use coinsync_core::SyncError;
use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur while talking to a Sui full node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Returns `true` if this error is retryable (transient).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }

    /// Map into the pipeline error for a call concerning `subject`
    /// (a digest, checkpoint or method name).
    pub fn into_sync_error(self, subject: &str) -> SyncError {
        match self {
            Self::Deserialization(e) => SyncError::Parse {
                digest: subject.to_string(),
                reason: e.to_string(),
            },
            other => SyncError::Ledger(format!("{subject}: {other}")),
        }
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Deserialization(e) => SyncError::Parse {
                digest: String::new(),
                reason: e.to_string(),
            },
            other => SyncError::Ledger(other.to_string()),
        }
    }
}
