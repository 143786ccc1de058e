//! Ledger contract — the read primitives the sync engine consumes.
//!
//! Records here are already decoded into closed sets of variants; a concrete
//! client (see `coinsync-sui`) is responsible for turning wire JSON into them
//! and for mapping anything it does not recognise to the `Other`/`Unknown`
//! variants rather than failing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

// ─── Records ─────────────────────────────────────────────────────────────────

/// A checkpoint header plus the digests it committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub sequence_number: u64,
    pub timestamp_ms: u64,
    /// Transaction digests in checkpoint order.
    pub transactions: Vec<String>,
}

/// Fully-loaded transaction as needed by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub digest: String,
    pub sender: String,
    pub kind: TransactionKind,
    /// `true` when execution status was `success`.
    pub success: bool,
    pub gas: GasCost,
    pub events: Vec<EmittedEvent>,
    pub balance_changes: Vec<BalanceChange>,
    pub timestamp_ms: Option<u64>,
    pub checkpoint: Option<u64>,
}

/// The transaction body, reduced to the shapes the extractor inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionKind {
    Programmable { commands: Vec<Command> },
    /// System transactions and shapes this client does not model.
    Other { name: String },
}

impl TransactionKind {
    /// Iterate over every move call in the body (empty for non-programmable).
    pub fn move_calls(&self) -> impl Iterator<Item = &MoveCall> {
        let commands: &[Command] = match self {
            Self::Programmable { commands } => commands,
            Self::Other { .. } => &[],
        };
        commands.iter().filter_map(|c| match c {
            Command::MoveCall(call) => Some(call),
            Command::Other(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    MoveCall(MoveCall),
    /// Any non-move-call command, by name (`TransferObjects`, `SplitCoins`, …).
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCall {
    pub package: String,
    pub module: String,
    pub function: String,
}

/// Gas cost summary. Fee may be negative when the rebate exceeds costs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasCost {
    pub computation: u64,
    pub storage: u64,
    pub rebate: u64,
}

impl GasCost {
    pub fn fee(&self) -> i128 {
        i128::from(self.computation) + i128::from(self.storage) - i128::from(self.rebate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedEvent {
    /// Fully-qualified Move event type.
    pub event_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub owner: Owner,
    pub coin_type: String,
    /// Signed decimal string as reported by the ledger.
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Owner {
    Address(String),
    Object(String),
    Shared,
    Immutable,
    Unknown,
}

impl Owner {
    /// Address owner first, then object owner, otherwise empty.
    pub fn resolve(&self) -> &str {
        match self {
            Self::Address(a) | Self::Object(a) => a,
            _ => "",
        }
    }
}

// ─── Address queries ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressFilter {
    FromAddress(String),
    ToAddress(String),
}

impl AddressFilter {
    pub fn address(&self) -> &str {
        match self {
            Self::FromAddress(a) | Self::ToAddress(a) => a,
        }
    }
}

impl std::fmt::Display for AddressFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FromAddress(a) => write!(f, "from:{a}"),
            Self::ToAddress(a) => write!(f, "to:{a}"),
        }
    }
}

/// Enough to locate a transaction and stamp its events before it is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLocator {
    pub digest: String,
    pub checkpoint: Option<u64>,
    pub timestamp_ms: Option<u64>,
}

impl TxLocator {
    pub fn new(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            checkpoint: None,
            timestamp_ms: None,
        }
    }
}

/// One page of an address listing.
#[derive(Debug, Clone, Default)]
pub struct TransactionPage {
    pub data: Vec<TransactionRecord>,
    /// Listed entries that could not be decoded. The rest of the page and
    /// its cursor are still valid.
    pub rejected: Vec<RejectedEntry>,
    pub next_cursor: Option<String>,
    pub has_next_page: bool,
}

/// A listed transaction whose record had an unexpected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    /// `None` when the entry did not even carry a digest.
    pub digest: Option<String>,
    pub reason: String,
}

// ─── Client trait ────────────────────────────────────────────────────────────

/// Read-only access to a ledger node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Sequence number of the most recent checkpoint.
    async fn latest_checkpoint(&self) -> Result<u64, SyncError>;

    async fn get_checkpoint(&self, sequence: u64) -> Result<CheckpointRecord, SyncError>;

    async fn get_transaction(&self, digest: &str) -> Result<TransactionRecord, SyncError>;

    /// One page of fully-loaded transactions matching `filter`, newest first.
    async fn query_by_address(
        &self,
        filter: &AddressFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<TransactionPage, SyncError>;
}
