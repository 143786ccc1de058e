//! [`LedgerClient`] for a Sui full node.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use coinsync_core::ledger::{
    AddressFilter, CheckpointRecord, LedgerClient, TransactionPage, TransactionRecord,
};
use coinsync_core::SyncError;

use crate::error::TransportError;
use crate::http::{HttpClientConfig, HttpTransport};
use crate::retry::RetryConfig;
use crate::wire::{self, WireCheckpoint, WireTransactionBlock, WireTransactionPage};

/// Connection settings for [`SuiLedgerClient`].
#[derive(Debug, Clone)]
pub struct SuiClientConfig {
    pub rpc_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
}

impl SuiClientConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

pub struct SuiLedgerClient {
    transport: HttpTransport,
}

impl SuiLedgerClient {
    pub fn new(config: SuiClientConfig) -> Result<Self, SyncError> {
        if config.rpc_url.trim().is_empty() {
            return Err(SyncError::InvalidArgument("rpc_url must not be empty".into()));
        }
        let transport = HttpTransport::new(
            config.rpc_url,
            HttpClientConfig {
                retry: RetryConfig {
                    max_retries: config.max_retries,
                    ..Default::default()
                },
                request_timeout: config.request_timeout,
            },
        )?;
        Ok(Self { transport })
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
        subject: &str,
    ) -> Result<T, SyncError> {
        let raw = self
            .transport
            .call(method, params)
            .await
            .map_err(|e| e.into_sync_error(subject))?;
        serde_json::from_value(raw).map_err(|e| TransportError::from(e).into_sync_error(subject))
    }
}

fn filter_param(filter: &AddressFilter) -> Value {
    match filter {
        AddressFilter::FromAddress(a) => json!({ "FromAddress": a }),
        AddressFilter::ToAddress(a) => json!({ "ToAddress": a }),
    }
}

#[async_trait]
impl LedgerClient for SuiLedgerClient {
    async fn latest_checkpoint(&self) -> Result<u64, SyncError> {
        let subject = "latest checkpoint";
        let raw: Value = self
            .call("sui_getLatestCheckpointSequenceNumber", vec![], subject)
            .await?;
        wire::de_u64(raw).map_err(|e| TransportError::from(e).into_sync_error(subject))
    }

    async fn get_checkpoint(&self, sequence: u64) -> Result<CheckpointRecord, SyncError> {
        let subject = format!("checkpoint {sequence}");
        let cp: WireCheckpoint = self
            .call("sui_getCheckpoint", vec![json!(sequence.to_string())], &subject)
            .await?;
        tracing::debug!(checkpoint = sequence, txs = cp.transactions.len(), "fetched checkpoint");
        Ok(cp.into())
    }

    async fn get_transaction(&self, digest: &str) -> Result<TransactionRecord, SyncError> {
        let block: WireTransactionBlock = self
            .call(
                "sui_getTransactionBlock",
                vec![json!(digest), wire::response_options()],
                digest,
            )
            .await?;
        TransactionRecord::try_from(block)
    }

    async fn query_by_address(
        &self,
        filter: &AddressFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<TransactionPage, SyncError> {
        let query = json!({
            "filter": filter_param(filter),
            "options": wire::response_options(),
        });
        let subject = filter.to_string();
        let page: WireTransactionPage = self
            .call(
                "suix_queryTransactionBlocks",
                vec![query, json!(cursor), json!(limit), json!(true)],
                &subject,
            )
            .await?;
        tracing::debug!(filter = %filter, txs = page.data.len(), has_next = page.has_next_page, "fetched page");
        Ok(TransactionPage::from(page))
    }
}
