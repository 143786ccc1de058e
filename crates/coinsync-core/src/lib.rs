//! coinsync-core — checkpoint sync engine for a single tracked token.
//!
//! # Architecture
//!
//! ```text
//! TransferService
//!   ├── SyncOrchestrator      (single-flight guard, checkpoint / address-scan modes)
//!   │     ├── ProgressStore   (watermark = max stored checkpoint)
//!   │     └── BatchProcessor  (bounded fan-out, mpsc collector, one bulk write)
//!   │           ├── TransactionExtractor (asset match + classification)
//!   │           └── dedup               ((digest, recipient, amount, kind))
//!   ├── StatisticsAggregator  (weekly / window / all-time)
//!   └── EventStore            (memory here; SQLite / Postgres in coinsync-storage)
//! ```
//!
//! The ledger itself sits behind [`LedgerClient`]; `coinsync-sui` provides a
//! JSON-RPC implementation.

pub mod config;
pub mod dedup;
pub mod error;
pub mod extractor;
pub mod ledger;
pub mod orchestrator;
pub mod processor;
pub mod progress;
pub mod service;
pub mod stats;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Pacing, ScanDirection, SingleFlightPolicy, SyncConfig, SyncMode};
pub use error::SyncError;
pub use extractor::TransactionExtractor;
pub use ledger::{AddressFilter, LedgerClient, TransactionRecord};
pub use orchestrator::{SyncOrchestrator, SyncOutcome};
pub use processor::{BatchFailure, BatchProcessor};
pub use progress::ProgressStore;
pub use service::TransferService;
pub use stats::{StatisticsAggregator, StatsAccumulator};
pub use store::{EventStore, MemoryEventStore};
pub use types::{EventKind, TimeWindow, TransferEvent, WindowStatistics};
