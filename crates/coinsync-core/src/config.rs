//! Sync engine configuration.
//!
//! A [`SyncConfig`] is built once at startup (usually deserialized from the
//! `[sync]` table of the application config) and handed to every component
//! constructor.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;

/// Top-level configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub asset: AssetConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    /// Which enumeration source feeds the processor.
    #[serde(default)]
    pub mode: SyncMode,
    /// Checkpoints per sub-batch in checkpoint mode.
    #[serde(default = "default_checkpoint_batch_size")]
    pub checkpoint_batch_size: u64,
    /// Ceiling on concurrent extraction tasks.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Lowest checkpoint a pass will scan, regardless of the stored watermark.
    #[serde(default)]
    pub start_checkpoint: u64,
    #[serde(default)]
    pub single_flight: SingleFlightPolicy,
    #[serde(default)]
    pub address_scan: AddressScanConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

/// The tracked asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Fully-qualified coin type, e.g. `0x…::chirp::CHIRP`.
    pub coin_type: String,
    /// Extra case-insensitive substrings that also identify the asset.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Heuristics used by the transaction extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Move function name that marks a claim.
    #[serde(default = "default_claim_function")]
    pub claim_function: String,
    /// Event-type substrings (case-insensitive) that mark a stake.
    #[serde(default = "default_stake_markers")]
    pub stake_markers: Vec<String>,
    /// Event-type substrings (case-insensitive) that mark an unstake.
    #[serde(default = "default_unstake_markers")]
    pub unstake_markers: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            claim_function: default_claim_function(),
            stake_markers: default_stake_markers(),
            unstake_markers: default_unstake_markers(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Walk checkpoints from the watermark to the ledger head.
    #[default]
    Checkpoints,
    /// Walk paginated transaction listings of configured addresses.
    AddressScan,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checkpoints => write!(f, "checkpoints"),
            Self::AddressScan => write!(f, "address-scan"),
        }
    }
}

/// What a sync call does when another pass already holds the lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleFlightPolicy {
    /// Wait for the running pass, then run (sync is idempotent).
    #[default]
    Wait,
    /// Return immediately with a skipped outcome.
    Skip,
}

/// Direction of an address listing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDirection {
    From,
    To,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressScanConfig {
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default = "default_scan_directions")]
    pub directions: Vec<ScanDirection>,
    /// Page size requested from the ledger.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Transactions per processor batch within a page.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Pause between consecutive page requests.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

impl Default for AddressScanConfig {
    fn default() -> Self {
        Self {
            addresses: vec![],
            directions: default_scan_directions(),
            page_limit: default_page_limit(),
            chunk_size: default_chunk_size(),
            pacing_ms: default_pacing_ms(),
        }
    }
}

impl AddressScanConfig {
    /// Configured addresses with blanks and duplicates removed, order kept.
    pub fn unique_addresses(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.addresses.len());
        for addr in &self.addresses {
            let addr = addr.trim();
            if addr.is_empty() || out.iter().any(|a| a == addr) {
                continue;
            }
            out.push(addr.to_string());
        }
        out
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::from_millis(self.pacing_ms)
    }
}

/// Read-path limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Limit used when the caller passes zero.
    #[serde(default = "default_query_limit")]
    pub default_limit: usize,
    /// Hard ceiling on rows returned by an address lookup.
    #[serde(default = "default_max_query_limit")]
    pub max_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_query_limit(),
            max_limit: default_max_query_limit(),
        }
    }
}

impl QueryConfig {
    pub fn clamp_limit(&self, requested: usize) -> usize {
        match requested {
            0 => self.default_limit.min(self.max_limit),
            n => n.min(self.max_limit),
        }
    }
}

/// Pause inserted between paginated ledger queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    None,
    Fixed(Duration),
}

impl Pacing {
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Self::None
        } else {
            Self::Fixed(Duration::from_millis(ms))
        }
    }

    /// Sleep for the configured delay, returning early once `cancel` fires.
    pub async fn pause(&self, cancel: &CancellationToken) {
        if let Self::Fixed(d) = self {
            tokio::select! {
                _ = tokio::time::sleep(*d) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }
}

fn default_checkpoint_batch_size() -> u64 { 10 }
fn default_max_workers() -> usize { 16 }
fn default_claim_function() -> String { "claim".into() }
fn default_stake_markers() -> Vec<String> { vec!["stakeproof".into(), "stake".into()] }
fn default_unstake_markers() -> Vec<String> { vec!["unstake".into()] }
fn default_scan_directions() -> Vec<ScanDirection> { vec![ScanDirection::From, ScanDirection::To] }
fn default_page_limit() -> usize { 50 }
fn default_chunk_size() -> usize { 100 }
fn default_pacing_ms() -> u64 { 500 }
fn default_query_limit() -> usize { 50 }
fn default_max_query_limit() -> usize { 1_000 }

impl SyncConfig {
    /// A config with defaults for everything but the tracked coin type.
    pub fn for_asset(coin_type: impl Into<String>) -> Self {
        Self {
            asset: AssetConfig {
                coin_type: coin_type.into(),
                aliases: vec![],
            },
            classification: ClassificationConfig::default(),
            mode: SyncMode::default(),
            checkpoint_batch_size: default_checkpoint_batch_size(),
            max_workers: default_max_workers(),
            start_checkpoint: 0,
            single_flight: SingleFlightPolicy::default(),
            address_scan: AddressScanConfig::default(),
            query: QueryConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.asset.coin_type.trim().is_empty() {
            return Err(SyncError::InvalidArgument("asset.coin_type must not be empty".into()));
        }
        if self.classification.claim_function.is_empty() {
            return Err(SyncError::InvalidArgument(
                "classification.claim_function must not be empty".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(SyncError::InvalidArgument("max_workers must be > 0".into()));
        }
        if self.checkpoint_batch_size == 0 {
            return Err(SyncError::InvalidArgument("checkpoint_batch_size must be > 0".into()));
        }
        if self.address_scan.page_limit == 0 || self.address_scan.chunk_size == 0 {
            return Err(SyncError::InvalidArgument(
                "address_scan.page_limit and address_scan.chunk_size must be > 0".into(),
            ));
        }
        if self.query.max_limit == 0 {
            return Err(SyncError::InvalidArgument("query.max_limit must be > 0".into()));
        }
        if self.mode == SyncMode::AddressScan && self.address_scan.unique_addresses().is_empty() {
            return Err(SyncError::InvalidArgument(
                "address_scan mode requires at least one address".into(),
            ));
        }
        Ok(())
    }
}
