//! coinsync-sui — Sui full-node JSON-RPC client for coinsync.
//!
//! # Modules
//! - [`client`] — [`SuiLedgerClient`], the `LedgerClient` implementation
//! - [`http`] — `reqwest` transport with retry on transient failures
//! - [`wire`] — Sui response shapes and decoding into core records
//! - [`request`] — JSON-RPC 2.0 envelopes
//! - [`retry`] — exponential backoff policy
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use coinsync_core::LedgerClient;
//! use coinsync_sui::{SuiClientConfig, SuiLedgerClient};
//!
//! # async fn run() -> Result<(), coinsync_core::SyncError> {
//! let client = SuiLedgerClient::new(SuiClientConfig::new("https://fullnode.mainnet.sui.io:443"))?;
//! let latest = client.latest_checkpoint().await?;
//! # let _ = latest;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod http;
pub mod request;
pub mod retry;
pub mod wire;

pub use client::{SuiClientConfig, SuiLedgerClient};
pub use error::TransportError;
pub use http::{HttpClientConfig, HttpTransport};
pub use retry::{RetryConfig, RetryPolicy};
