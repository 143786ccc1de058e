//! Error types for the coinsync pipeline.

use thiserror::Error;

/// Errors that can occur while syncing or querying transfer events.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Ledger unreachable, timed out, or returned a transport-level failure.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// A ledger record did not have the expected shape.
    #[error("Unexpected record shape for {digest}: {reason}")]
    Parse { digest: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Sync aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Returns `true` for failures a later pass is expected to get past.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Ledger(_))
    }

    /// Returns `true` if the error must be surfaced to the caller of a sync
    /// pass instead of being recorded against a single sub-batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Aborted { .. })
    }
}
