//! `TransferService` — the facade handed to outer surfaces (CLI, servers).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::{QueryConfig, SyncConfig};
use crate::error::SyncError;
use crate::ledger::LedgerClient;
use crate::orchestrator::{SyncOrchestrator, SyncOutcome};
use crate::stats::StatisticsAggregator;
use crate::store::EventStore;
use crate::types::{TransferEvent, WindowStatistics};

pub struct TransferService {
    orchestrator: Arc<SyncOrchestrator>,
    store: Arc<dyn EventStore>,
    stats: StatisticsAggregator,
    query: QueryConfig,
}

impl TransferService {
    pub fn new(
        config: Arc<SyncConfig>,
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn EventStore>,
    ) -> Result<Self, SyncError> {
        let query = config.query;
        let orchestrator = SyncOrchestrator::new(config, ledger, store.clone())?;
        Ok(Self::from_orchestrator(Arc::new(orchestrator), store, query))
    }

    pub fn from_orchestrator(
        orchestrator: Arc<SyncOrchestrator>,
        store: Arc<dyn EventStore>,
        query: QueryConfig,
    ) -> Self {
        Self {
            orchestrator,
            stats: StatisticsAggregator::new(store.clone()),
            store,
            query,
        }
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub async fn sync(&self, cancel: &CancellationToken) -> Result<SyncOutcome, SyncError> {
        self.orchestrator.sync(cancel).await
    }

    pub async fn backfill(
        &self,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        self.orchestrator.sync_range(start, end, cancel).await
    }

    /// Events sent or received by `address`, newest first.
    ///
    /// `limit == 0` means the configured default; anything above the
    /// configured maximum is clamped to it.
    pub async fn get_by_address(
        &self,
        address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransferEvent>, SyncError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(SyncError::InvalidArgument("address must not be empty".into()));
        }
        let limit = self.query.clamp_limit(limit);
        self.store.events_by_address(address, limit, offset).await
    }

    pub async fn get_by_digest(&self, digest: &str) -> Result<Vec<TransferEvent>, SyncError> {
        self.store.events_by_digest(digest).await
    }

    pub async fn window_statistics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowStatistics, SyncError> {
        self.stats.window(start, end).await
    }

    pub async fn weekly_statistics(&self) -> Result<WindowStatistics, SyncError> {
        self.stats.weekly().await
    }

    pub async fn all_time_statistics(&self) -> Result<WindowStatistics, SyncError> {
        self.stats.all_time().await
    }

    pub async fn watermark(&self) -> Result<u64, SyncError> {
        self.orchestrator.watermark().await
    }

    pub async fn event_count(&self) -> Result<u64, SyncError> {
        self.store.event_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryEventStore;
    use crate::test_support::{chirp_tx, ScriptedLedger, COIN};
    use rust_decimal::Decimal;

    fn busy_ledger(n: usize) -> Arc<ScriptedLedger> {
        let ledger = ScriptedLedger::new();
        let txs = (0..n)
            .map(|i| chirp_tx(&format!("T{i:04}"), "0xwhale", &[("0xwhale", "-1")], None))
            .collect();
        ledger.push_checkpoint(1, 1_700_000_000_000, txs);
        Arc::new(ledger)
    }

    #[tokio::test]
    async fn address_limit_is_clamped() {
        let service = TransferService::new(
            Arc::new(SyncConfig::for_asset(COIN)),
            busy_ledger(1_200),
            Arc::new(MemoryEventStore::new()),
        )
        .unwrap();
        service.sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(service.event_count().await.unwrap(), 1_200);

        assert_eq!(service.get_by_address("0xwhale", 2_000, 0).await.unwrap().len(), 1_000);
        assert_eq!(service.get_by_address("0xwhale", 0, 0).await.unwrap().len(), 50);
        assert_eq!(service.get_by_address("0xwhale", 10, 1_195).await.unwrap().len(), 5);
        assert!(service.get_by_address(" ", 10, 0).await.is_err());
    }

    #[tokio::test]
    async fn statistics_after_sync() {
        let ledger = ScriptedLedger::new();
        let now_ms = Utc::now().timestamp_millis() as u64;
        ledger.push_checkpoint(
            1,
            now_ms - 60_000,
            vec![
                chirp_tx("C", "0xdrop", &[("0xa", "100")], Some("claim")),
                chirp_tx("S", "0xb", &[("0xb", "-40")], None),
            ],
        );
        let service = TransferService::new(
            Arc::new(SyncConfig::for_asset(COIN)),
            Arc::new(ledger),
            Arc::new(MemoryEventStore::new()),
        )
        .unwrap();
        service.sync(&CancellationToken::new()).await.unwrap();

        let weekly = service.weekly_statistics().await.unwrap();
        assert_eq!(weekly.total_claimed, Decimal::from(100));
        assert_eq!(weekly.total_sold, Decimal::from(40));
        assert_eq!(weekly.total_tx_count, 2);

        let start = Utc::now() - chrono::Duration::hours(1);
        let window = service.window_statistics(start, Utc::now()).await.unwrap();
        assert_eq!(window, WindowStatistics { period_start: window.period_start, period_end: window.period_end, ..weekly });
        assert!(service.window_statistics(Utc::now(), start).await.is_err());
        assert_eq!(service.get_by_digest("C").await.unwrap().len(), 1);
    }
}
