//! Sync orchestrator — the single entry point for sync passes.
//!
//! Every trigger (timer, on-demand call, explicit backfill) goes through the
//! same single-flight guard. Within a pass, checkpoints are scanned low to
//! high in sub-batches so the watermark only moves forward.
//!
//! ```text
//! sync() ─ guard ─▶ ProgressStore::next_range ─▶ sub_batches ─┐
//!                                                            ▼
//!                   get_checkpoint × N ─▶ BatchProcessor::process ─▶ EventStore
//! ```

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Pacing, ScanDirection, SingleFlightPolicy, SyncConfig, SyncMode};
use crate::error::SyncError;
use crate::extractor::TransactionExtractor;
use crate::ledger::{AddressFilter, LedgerClient, TxLocator};
use crate::processor::{BatchFailure, BatchItem, BatchProcessor, BatchReport};
use crate::progress::{sub_batches, ProgressStore};
use crate::store::EventStore;

// ─── SyncOutcome ─────────────────────────────────────────────────────────────

/// What one sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub mode: SyncMode,
    /// Another pass held the guard and the policy is `skip`.
    pub skipped: bool,
    /// The pass stopped early on cancellation.
    pub cancelled: bool,
    pub watermark_before: u64,
    pub watermark_after: u64,
    pub checkpoints_scanned: u64,
    pub pages_scanned: u64,
    /// Transactions loaded and run through the extractor.
    pub processed: u64,
    pub skipped_known: u64,
    pub malformed: u64,
    /// Events extracted before deduplication.
    pub events_found: u64,
    /// Rows newly written.
    pub inserted: u64,
    pub failures: Vec<BatchFailure>,
}

impl SyncOutcome {
    fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }

    /// `true` when some unit of work failed and may need a re-drive.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    fn absorb(&mut self, report: BatchReport) {
        self.processed += report.processed;
        self.skipped_known += report.skipped_known;
        self.malformed += report.malformed;
        self.events_found += report.events_found;
        self.inserted += report.inserted;
        self.failures.extend(report.failures);
    }

    fn record_failure(&mut self, scope: String, err: &SyncError) {
        warn!(scope = %scope, error = %err, "Sync unit failed; continuing");
        self.failures.push(BatchFailure::new(scope, err));
    }
}

// ─── SyncOrchestrator ────────────────────────────────────────────────────────

pub struct SyncOrchestrator {
    config: Arc<SyncConfig>,
    ledger: Arc<dyn LedgerClient>,
    progress: ProgressStore,
    processor: BatchProcessor,
    guard: Mutex<()>,
    pacing: Pacing,
}

impl SyncOrchestrator {
    pub fn new(
        config: Arc<SyncConfig>,
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn EventStore>,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let extractor = Arc::new(TransactionExtractor::new(&config.asset, &config.classification));
        let processor = BatchProcessor::new(ledger.clone(), store.clone(), extractor, config.max_workers);
        Ok(Self {
            progress: ProgressStore::new(store, config.start_checkpoint),
            pacing: config.address_scan.pacing(),
            config,
            ledger,
            processor,
            guard: Mutex::new(()),
        })
    }

    /// Override the pause between address-listing pages.
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn watermark(&self) -> Result<u64, SyncError> {
        self.progress.watermark().await
    }

    async fn enter(&self, cancel: &CancellationToken) -> Result<Option<MutexGuard<'_, ()>>, SyncError> {
        match self.config.single_flight {
            SingleFlightPolicy::Skip => Ok(self.guard.try_lock().ok()),
            SingleFlightPolicy::Wait => tokio::select! {
                biased;
                guard = self.guard.lock() => Ok(Some(guard)),
                _ = cancel.cancelled() => Err(SyncError::Cancelled),
            },
        }
    }

    /// Run one pass in the configured mode.
    pub async fn sync(&self, cancel: &CancellationToken) -> Result<SyncOutcome, SyncError> {
        let mode = self.config.mode;
        let Some(_guard) = self.enter(cancel).await? else {
            info!(mode = %mode, "Sync already running; skipping");
            return Ok(SyncOutcome {
                skipped: true,
                ..SyncOutcome::new(mode)
            });
        };

        let mut outcome = SyncOutcome::new(mode);
        outcome.watermark_before = self.progress.watermark().await?;

        match mode {
            SyncMode::Checkpoints => {
                let latest = self.ledger.latest_checkpoint().await?;
                match self.progress.next_range(latest).await? {
                    Some(range) => {
                        info!(
                            from = range.start(),
                            to = range.end(),
                            watermark = outcome.watermark_before,
                            "Synchronizing checkpoints"
                        );
                        self.scan_checkpoints(range, cancel, &mut outcome).await?;
                    }
                    None => debug!(latest, watermark = outcome.watermark_before, "Already up to date"),
                }
            }
            SyncMode::AddressScan => self.scan_addresses(cancel, &mut outcome).await?,
        }

        outcome.watermark_after = self.progress.watermark().await?;
        log_outcome(&outcome);
        Ok(outcome)
    }

    /// Scan an explicit checkpoint range, ignoring the watermark.
    pub async fn sync_range(
        &self,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        if start > end {
            return Err(SyncError::InvalidArgument(format!(
                "range start {start} is after end {end}"
            )));
        }
        let Some(_guard) = self.enter(cancel).await? else {
            info!(start, end, "Sync already running; skipping range");
            return Ok(SyncOutcome {
                skipped: true,
                ..SyncOutcome::new(SyncMode::Checkpoints)
            });
        };

        let mut outcome = SyncOutcome::new(SyncMode::Checkpoints);
        outcome.watermark_before = self.progress.watermark().await?;
        info!(from = start, to = end, "Backfilling checkpoint range");
        self.scan_checkpoints(start..=end, cancel, &mut outcome).await?;
        outcome.watermark_after = self.progress.watermark().await?;
        log_outcome(&outcome);
        Ok(outcome)
    }

    /// Call [`sync`](Self::sync) every `every` until `cancel` fires.
    pub async fn run_periodic(&self, every: Duration, run_on_start: bool, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !run_on_start {
            // interval's first tick completes immediately
            ticker.tick().await;
        }
        info!(interval_secs = every.as_secs_f64(), "Periodic sync started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.sync(&cancel).await {
                Ok(_) => {}
                Err(SyncError::Cancelled) => break,
                Err(e) => error!(error = %e, "Sync pass failed"),
            }
        }
        info!("Periodic sync stopped");
    }

    // ─── Enumeration sources ────────────────────────────────────────────────

    async fn scan_checkpoints(
        &self,
        range: RangeInclusive<u64>,
        cancel: &CancellationToken,
        outcome: &mut SyncOutcome,
    ) -> Result<(), SyncError> {
        for batch in sub_batches(range, self.config.checkpoint_batch_size) {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let mut items = Vec::new();
            for seq in batch.clone() {
                if cancel.is_cancelled() {
                    break;
                }
                match self.ledger.get_checkpoint(seq).await {
                    Ok(cp) => {
                        outcome.checkpoints_scanned += 1;
                        if !cp.transactions.is_empty() {
                            debug!(checkpoint = seq, transactions = cp.transactions.len(), "Checkpoint loaded");
                        }
                        items.extend(cp.transactions.into_iter().map(|digest| {
                            BatchItem::Locator(TxLocator {
                                digest,
                                checkpoint: Some(cp.sequence_number),
                                timestamp_ms: Some(cp.timestamp_ms),
                            })
                        }));
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => outcome.record_failure(format!("checkpoint {seq}"), &e),
                }
            }
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let report = self.processor.process(items, cancel).await?;
            info!(
                from = batch.start(),
                to = batch.end(),
                processed = report.processed,
                inserted = report.inserted,
                "Checkpoint batch done"
            );
            outcome.absorb(report);
        }
        Ok(())
    }

    async fn scan_addresses(
        &self,
        cancel: &CancellationToken,
        outcome: &mut SyncOutcome,
    ) -> Result<(), SyncError> {
        let scan = &self.config.address_scan;
        let addresses = scan.unique_addresses();
        info!(addresses = addresses.len(), "Scanning monitored addresses");

        'scan: for address in &addresses {
            for direction in &scan.directions {
                let filter = match direction {
                    ScanDirection::From => AddressFilter::FromAddress(address.clone()),
                    ScanDirection::To => AddressFilter::ToAddress(address.clone()),
                };
                let mut cursor: Option<String> = None;
                let mut first_page = true;

                loop {
                    if !first_page {
                        self.pacing.pause(cancel).await;
                    }
                    first_page = false;
                    if cancel.is_cancelled() {
                        outcome.cancelled = true;
                        break 'scan;
                    }

                    let page = match self
                        .ledger
                        .query_by_address(&filter, cursor.clone(), scan.page_limit)
                        .await
                    {
                        Ok(page) => page,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            let after = cursor.as_deref().unwrap_or("start");
                            outcome.record_failure(format!("{filter} page after {after}"), &e);
                            break;
                        }
                    };
                    outcome.pages_scanned += 1;
                    debug!(
                        filter = %filter,
                        transactions = page.data.len(),
                        rejected = page.rejected.len(),
                        "Address page loaded"
                    );

                    // Rejected entries are re-read by digest; the processor
                    // counts them as malformed if they still do not decode.
                    let mut items: Vec<BatchItem> = page.data.into_iter().map(BatchItem::Loaded).collect();
                    for entry in page.rejected {
                        match entry.digest {
                            Some(digest) => items.push(BatchItem::Locator(TxLocator::new(digest))),
                            None => {
                                warn!(filter = %filter, reason = %entry.reason, "Dropping page entry without a digest");
                                outcome.malformed += 1;
                            }
                        }
                    }
                    while !items.is_empty() {
                        let rest = items.split_off(scan.chunk_size.min(items.len()));
                        let chunk = std::mem::replace(&mut items, rest);
                        outcome.absorb(self.processor.process(chunk, cancel).await?);
                    }

                    match page.next_cursor {
                        Some(next) if page.has_next_page => cursor = Some(next),
                        _ => break,
                    }
                }
            }
        }
        Ok(())
    }
}

fn log_outcome(outcome: &SyncOutcome) {
    info!(
        mode = %outcome.mode,
        checkpoints = outcome.checkpoints_scanned,
        pages = outcome.pages_scanned,
        processed = outcome.processed,
        inserted = outcome.inserted,
        failed = outcome.failed(),
        watermark = outcome.watermark_after,
        cancelled = outcome.cancelled,
        "Sync pass complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{RejectedEntry, TransactionPage, TransactionRecord};
    use crate::store::MemoryEventStore;
    use crate::test_support::{chirp_tx, ScriptedLedger, COIN};
    use crate::types::EventKind;
    use std::collections::HashSet;

    fn orchestrator(
        cfg: SyncConfig,
        ledger: Arc<ScriptedLedger>,
        store: Arc<MemoryEventStore>,
    ) -> SyncOrchestrator {
        SyncOrchestrator::new(Arc::new(cfg), ledger, store)
            .unwrap()
            .with_pacing(Pacing::None)
    }

    fn seeded_ledger() -> Arc<ScriptedLedger> {
        let ledger = ScriptedLedger::new();
        ledger.push_checkpoint(
            3,
            1_700_000_000_000,
            vec![chirp_tx("A", "0xalice", &[("0xbob", "100"), ("0xalice", "-100")], None)],
        );
        ledger.push_checkpoint(
            7,
            1_700_000_060_000,
            vec![chirp_tx("B", "0xdrop", &[("0xcarol", "500")], Some("claim"))],
        );
        ledger.set_latest(12);
        Arc::new(ledger)
    }

    #[tokio::test]
    async fn second_sync_is_idempotent() {
        let ledger = seeded_ledger();
        let store = Arc::new(MemoryEventStore::new());
        let orch = orchestrator(SyncConfig::for_asset(COIN), ledger.clone(), store.clone());

        let first = orch.sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(first.processed, 2);
        assert_eq!(first.checkpoints_scanned, 12);
        assert_eq!(first.watermark_before, 0);
        assert_eq!(first.watermark_after, 7);

        let second = orch.sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(store.event_count().await.unwrap(), 3);

        let claims = store.events_by_digest("B").await.unwrap();
        assert_eq!(claims[0].kind, EventKind::Claim);
    }

    #[tokio::test]
    async fn watermark_never_decreases() {
        let ledger = seeded_ledger();
        let store = Arc::new(MemoryEventStore::new());
        let orch = orchestrator(SyncConfig::for_asset(COIN), ledger.clone(), store);

        let mut last = 0;
        for (seq, digest) in [(15u64, "C"), (16, "D"), (20, "E")] {
            ledger.push_checkpoint(
                seq,
                1_700_000_100_000 + seq,
                vec![chirp_tx(digest, "0xa", &[("0xb", "1")], None)],
            );
            let outcome = orch.sync(&CancellationToken::new()).await.unwrap();
            assert!(outcome.watermark_after >= last);
            assert!(outcome.watermark_after >= outcome.watermark_before);
            last = outcome.watermark_after;
        }
        assert_eq!(last, 20);
    }

    #[tokio::test]
    async fn checkpoint_failure_is_reported_and_scan_continues() {
        let ledger = seeded_ledger();
        ledger.fail_checkpoint(3);
        let store = Arc::new(MemoryEventStore::new());
        let orch = orchestrator(SyncConfig::for_asset(COIN), ledger.clone(), store.clone());

        let outcome = orch.sync(&CancellationToken::new()).await.unwrap();
        assert!(outcome.is_partial());
        assert_eq!(outcome.failures[0].scope, "checkpoint 3");
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.watermark_after, 7);

        ledger.heal_checkpoint(3);
        let redrive = orch.sync_range(3, 3, &CancellationToken::new()).await.unwrap();
        assert!(!redrive.is_partial());
        assert_eq!(redrive.inserted, 2);
        assert_eq!(store.event_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn start_checkpoint_is_a_floor() {
        let ledger = seeded_ledger();
        let store = Arc::new(MemoryEventStore::new());
        let mut cfg = SyncConfig::for_asset(COIN);
        cfg.start_checkpoint = 5;
        let orch = orchestrator(cfg, ledger.clone(), store.clone());

        let outcome = orch.sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.checkpoints_scanned, 8);
        assert!(!store.exists_by_digest("A").await.unwrap());
        assert!(store.exists_by_digest("B").await.unwrap());
    }

    #[tokio::test]
    async fn sub_batches_follow_batch_size() {
        let ledger = seeded_ledger();
        let store = Arc::new(MemoryEventStore::new());
        let mut cfg = SyncConfig::for_asset(COIN);
        cfg.checkpoint_batch_size = 4;
        let orch = orchestrator(cfg, ledger.clone(), store);
        let outcome = orch.sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.checkpoints_scanned, 12);
        assert_eq!(ledger.checkpoint_calls(), 12);
    }

    #[tokio::test]
    async fn concurrent_syncs_store_each_event_once() {
        let ledger = seeded_ledger();
        ledger.set_delay(Duration::from_millis(10));
        let store = Arc::new(MemoryEventStore::new());
        let orch = Arc::new(orchestrator(SyncConfig::for_asset(COIN), ledger, store.clone()));

        let a = tokio::spawn({
            let orch = orch.clone();
            async move { orch.sync(&CancellationToken::new()).await }
        });
        let b = tokio::spawn({
            let orch = orch.clone();
            async move { orch.sync(&CancellationToken::new()).await }
        });
        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a.inserted + b.inserted, 3);

        let all = store.all().unwrap();
        let keys: HashSet<_> = all.iter().map(|e| e.key()).collect();
        assert_eq!(keys.len(), all.len());
    }

    #[tokio::test]
    async fn skip_policy_returns_immediately_while_held() {
        let ledger = seeded_ledger();
        let store = Arc::new(MemoryEventStore::new());
        let mut cfg = SyncConfig::for_asset(COIN);
        cfg.single_flight = SingleFlightPolicy::Skip;
        let orch = orchestrator(cfg, ledger, store);

        let held = orch.guard.lock().await;
        let outcome = orch.sync(&CancellationToken::new()).await.unwrap();
        assert!(outcome.skipped);
        assert_eq!(outcome.processed, 0);
        drop(held);

        let outcome = orch.sync(&CancellationToken::new()).await.unwrap();
        assert!(!outcome.skipped);
    }

    #[tokio::test]
    async fn waiting_for_guard_honours_cancellation() {
        let orch = orchestrator(
            SyncConfig::for_asset(COIN),
            seeded_ledger(),
            Arc::new(MemoryEventStore::new()),
        );
        let _held = orch.guard.lock().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(orch.sync(&cancel).await, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn cancelled_pass_issues_no_ledger_calls() {
        let ledger = seeded_ledger();
        let orch = orchestrator(
            SyncConfig::for_asset(COIN),
            ledger.clone(),
            Arc::new(MemoryEventStore::new()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = orch.sync_range(1, 50, &cancel).await;
        // Guard is free, so the pass starts and stops at the first boundary.
        let outcome = outcome.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(ledger.checkpoint_calls(), 0);
    }

    #[tokio::test]
    async fn inverted_backfill_range_rejected() {
        let orch = orchestrator(
            SyncConfig::for_asset(COIN),
            seeded_ledger(),
            Arc::new(MemoryEventStore::new()),
        );
        assert!(matches!(
            orch.sync_range(9, 2, &CancellationToken::new()).await,
            Err(SyncError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn address_scan_walks_both_directions_and_pages() {
        let ledger = ScriptedLedger::new();
        let mut t1 = chirp_tx("P1", "0xme", &[("0xyou", "10"), ("0xme", "-10")], None);
        t1.checkpoint = Some(30);
        t1.timestamp_ms = Some(1_700_000_000_000);
        let mut t2 = chirp_tx("P2", "0xother", &[("0xme", "4")], None);
        t2.checkpoint = Some(31);
        t2.timestamp_ms = Some(1_700_000_001_000);

        let from = AddressFilter::FromAddress("0xme".into());
        let to = AddressFilter::ToAddress("0xme".into());
        ledger.push_page(
            &from,
            None,
            TransactionPage {
                data: vec![t1.clone()],
                next_cursor: Some("c1".into()),
                has_next_page: true,
                ..Default::default()
            },
        );
        ledger.push_page(&from, Some("c1"), TransactionPage::default());
        // The receiving side sees P1 again (the self-debit) plus P2.
        ledger.push_page(
            &to,
            None,
            TransactionPage {
                data: vec![t1, t2],
                next_cursor: None,
                has_next_page: false,
                ..Default::default()
            },
        );
        let ledger = Arc::new(ledger);

        let mut cfg = SyncConfig::for_asset(COIN);
        cfg.mode = SyncMode::AddressScan;
        cfg.address_scan.addresses = vec!["0xme".into(), "0xme".into()];
        cfg.address_scan.chunk_size = 1;
        let store = Arc::new(MemoryEventStore::new());
        let orch = orchestrator(cfg, ledger.clone(), store.clone());

        let outcome = orch.sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.mode, SyncMode::AddressScan);
        assert_eq!(outcome.pages_scanned, 3);
        assert_eq!(ledger.page_calls(), 3);
        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.skipped_known, 1);
        assert_eq!(outcome.watermark_after, 31);
    }

    #[tokio::test]
    async fn rejected_page_entries_do_not_drop_the_page() {
        let stamp = |mut tx: TransactionRecord, cp: u64| {
            tx.checkpoint = Some(cp);
            tx.timestamp_ms = Some(1_700_000_000_000 + cp);
            tx
        };
        let ledger = ScriptedLedger::new();
        let recovered = stamp(chirp_tx("RETRY", "0xme", &[("0xme", "-8")], None), 53);
        ledger.push_checkpoint(53, 1_700_000_000_053, vec![recovered]);
        ledger.malform_transaction("BAD");

        let from = AddressFilter::FromAddress("0xme".into());
        let rejected = |digest: Option<&str>| RejectedEntry {
            digest: digest.map(str::to_string),
            reason: "response has no effects".into(),
        };
        ledger.push_page(
            &from,
            None,
            TransactionPage {
                data: vec![
                    stamp(chirp_tx("GOOD1", "0xme", &[("0xme", "-5")], None), 50),
                    stamp(chirp_tx("GOOD2", "0xme", &[("0xme", "-6")], None), 51),
                ],
                rejected: vec![rejected(Some("BAD")), rejected(Some("RETRY")), rejected(None)],
                next_cursor: Some("c1".into()),
                has_next_page: true,
            },
        );
        ledger.push_page(
            &from,
            Some("c1"),
            TransactionPage {
                data: vec![stamp(chirp_tx("LATER", "0xme", &[("0xme", "-7")], None), 52)],
                ..Default::default()
            },
        );
        let ledger = Arc::new(ledger);

        let mut cfg = SyncConfig::for_asset(COIN);
        cfg.mode = SyncMode::AddressScan;
        cfg.address_scan.addresses = vec!["0xme".into()];
        cfg.address_scan.directions = vec![ScanDirection::From];
        let store = Arc::new(MemoryEventStore::new());
        let orch = orchestrator(cfg, ledger.clone(), store.clone());

        let outcome = orch.sync(&CancellationToken::new()).await.unwrap();
        assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
        assert_eq!(outcome.pages_scanned, 2);
        assert_eq!(outcome.malformed, 2);
        assert_eq!(outcome.inserted, 4);
        assert_eq!(ledger.transaction_calls(), 2);
        for digest in ["GOOD1", "GOOD2", "RETRY", "LATER"] {
            assert!(store.exists_by_digest(digest).await.unwrap(), "{digest} not stored");
        }
        assert!(!store.exists_by_digest("BAD").await.unwrap());
        assert_eq!(outcome.watermark_after, 53);
    }

    #[tokio::test]
    async fn periodic_runs_until_cancelled() {
        let ledger = seeded_ledger();
        let store = Arc::new(MemoryEventStore::new());
        let orch = Arc::new(orchestrator(SyncConfig::for_asset(COIN), ledger, store.clone()));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let orch = orch.clone();
            let cancel = cancel.clone();
            async move { orch.run_periodic(Duration::from_millis(10), true, cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(store.event_count().await.unwrap(), 3);
    }
}
