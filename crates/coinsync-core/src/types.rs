//! Shared types for the sync pipeline.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

// ─── EventKind ───────────────────────────────────────────────────────────────

/// Semantic type of a transfer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Claim,
    Transfer,
    Stake,
    Unstake,
    Buy,
    Sell,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        Self::Claim,
        Self::Transfer,
        Self::Stake,
        Self::Unstake,
        Self::Buy,
        Self::Sell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::Transfer => "transfer",
            Self::Stake => "stake",
            Self::Unstake => "unstake",
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SyncError::InvalidArgument(format!("unknown event kind '{s}'")))
    }
}

// ─── TransferEvent ───────────────────────────────────────────────────────────

/// One classified movement of the tracked asset.
///
/// Amounts and fees are kept as the ledger's decimal strings and are only
/// parsed (exactly) when aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Ledger-assigned transaction digest.
    pub digest: String,
    pub sender: String,
    /// Empty when the balance-change owner could not be resolved.
    pub recipient: String,
    /// Signed decimal string.
    pub amount: String,
    pub kind: EventKind,
    /// Checkpoint sequence that included the transaction.
    pub checkpoint: u64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// `computation + storage - rebate`, signed decimal string.
    pub gas_fee: String,
}

impl TransferEvent {
    /// The uniqueness key shared by the deduplicator and every store.
    pub fn key(&self) -> EventKey {
        EventKey {
            digest: self.digest.clone(),
            recipient: self.recipient.clone(),
            amount: self.amount.clone(),
            kind: self.kind,
        }
    }

    /// Returns `true` if `address` is the sender or the recipient.
    pub fn involves(&self, address: &str) -> bool {
        self.sender == address || self.recipient == address
    }
}

/// `(digest, recipient, amount, kind)`: unique across all stored events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub digest: String,
    pub recipient: String,
    pub amount: String,
    pub kind: EventKind,
}

/// Convert ledger-reported milliseconds into a UTC timestamp.
pub fn timestamp_from_millis(ms: u64) -> Option<DateTime<Utc>> {
    i64::try_from(ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

// ─── TimeWindow ──────────────────────────────────────────────────────────────

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, SyncError> {
        if start >= end {
            return Err(SyncError::InvalidArgument(format!(
                "window start {start} must be before end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The trailing `days`-day window ending at `now`.
    pub fn trailing_days(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: now - Duration::days(days),
            end: now,
        }
    }

    /// Everything from the Unix epoch up to `now`.
    pub fn all_time(now: DateTime<Utc>) -> Self {
        Self {
            start: DateTime::<Utc>::default(),
            end: now,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

// ─── WindowStatistics ────────────────────────────────────────────────────────

/// Aggregates over a time window, computed on demand and never persisted.
///
/// Per-kind totals sum amount magnitudes of successful events, so a `sell`
/// of `"-40"` contributes `40` to `total_sold`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStatistics {
    #[serde(with = "rust_decimal::serde::str")]
    pub total_claimed: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_transferred: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_staked: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_unstaked: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_bought: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_sold: Decimal,
    /// Distinct senders in the window, failed transactions included.
    pub unique_holders: u64,
    /// Successful events in the window.
    pub total_tx_count: u64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl WindowStatistics {
    pub fn empty(window: &TimeWindow) -> Self {
        Self {
            total_claimed: Decimal::ZERO,
            total_transferred: Decimal::ZERO,
            total_staked: Decimal::ZERO,
            total_unstaked: Decimal::ZERO,
            total_bought: Decimal::ZERO,
            total_sold: Decimal::ZERO,
            unique_holders: 0,
            total_tx_count: 0,
            period_start: window.start,
            period_end: window.end,
        }
    }

    pub fn total_for(&self, kind: EventKind) -> Decimal {
        match kind {
            EventKind::Claim => self.total_claimed,
            EventKind::Transfer => self.total_transferred,
            EventKind::Stake => self.total_staked,
            EventKind::Unstake => self.total_unstaked,
            EventKind::Buy => self.total_bought,
            EventKind::Sell => self.total_sold,
        }
    }

    pub(crate) fn total_mut(&mut self, kind: EventKind) -> &mut Decimal {
        match kind {
            EventKind::Claim => &mut self.total_claimed,
            EventKind::Transfer => &mut self.total_transferred,
            EventKind::Stake => &mut self.total_staked,
            EventKind::Unstake => &mut self.total_unstaked,
            EventKind::Buy => &mut self.total_bought,
            EventKind::Sell => &mut self.total_sold,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
