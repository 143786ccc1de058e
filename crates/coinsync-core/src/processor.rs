//! Concurrent batch processor.
//!
//! A batch of transaction locators (or already-loaded records) is fanned out
//! to at most `max_workers` tasks. Each task checks the store, loads the
//! transaction if needed and extracts events, then sends its result to the
//! single collector over a bounded channel. Once every task has reported,
//! results are merged in input order, deduplicated once and written with a
//! single `insert_batch` call.
//!
//! ```text
//! dispatcher ──permit──▶ task ─┐
//!            ──permit──▶ task ─┼─ mpsc ─▶ collector ─▶ dedup ─▶ insert_batch
//!            ──permit──▶ task ─┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dedup::dedup;
use crate::error::SyncError;
use crate::extractor::TransactionExtractor;
use crate::ledger::{LedgerClient, TransactionRecord, TxLocator};
use crate::store::EventStore;
use crate::types::TransferEvent;

// ─── Inputs & outputs ────────────────────────────────────────────────────────

/// One unit of work for the processor.
#[derive(Debug, Clone)]
pub enum BatchItem {
    /// Only the digest (and position) is known; the task fetches the record.
    Locator(TxLocator),
    /// The record came with the listing that enumerated it.
    Loaded(TransactionRecord),
}

impl BatchItem {
    pub fn digest(&self) -> &str {
        match self {
            Self::Locator(l) => &l.digest,
            Self::Loaded(r) => &r.digest,
        }
    }
}

/// A unit of work that could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// What failed: a digest, a checkpoint or an address page.
    pub scope: String,
    pub reason: String,
}

impl BatchFailure {
    pub fn new(scope: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            scope: scope.into(),
            reason: reason.to_string(),
        }
    }
}

/// Counters for one processed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Items loaded and run through the extractor.
    pub processed: u64,
    /// Items whose digest was already stored.
    pub skipped_known: u64,
    /// Items whose record had an unexpected shape (zero events).
    pub malformed: u64,
    /// Items never dispatched because the batch was cancelled.
    pub not_dispatched: u64,
    /// Events extracted before deduplication.
    pub events_found: u64,
    /// Events left after deduplication.
    pub events_unique: u64,
    /// Rows actually written by the store.
    pub inserted: u64,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }
}

enum ItemOutcome {
    Known,
    Extracted(Vec<TransferEvent>),
    Malformed(String),
    Failed(SyncError),
}

// ─── BatchProcessor ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BatchProcessor {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn EventStore>,
    extractor: Arc<TransactionExtractor>,
    max_workers: usize,
}

impl BatchProcessor {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn EventStore>,
        extractor: Arc<TransactionExtractor>,
        max_workers: usize,
    ) -> Self {
        Self {
            ledger,
            store,
            extractor,
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Process `items` and persist the merged, deduplicated events.
    ///
    /// Per-item ledger and shape failures are recorded in the report. A store
    /// failure (during the known-digest check or the final write) is returned
    /// as an error.
    pub async fn process(
        &self,
        items: Vec<BatchItem>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, SyncError> {
        let mut report = BatchReport::default();
        if items.is_empty() {
            return Ok(report);
        }
        let total = items.len();

        let (tx, mut rx) = mpsc::channel::<(usize, String, ItemOutcome)>(self.max_workers);
        let dispatcher = tokio::spawn(dispatch(
            items,
            tx,
            Arc::new(Semaphore::new(self.max_workers)),
            self.ledger.clone(),
            self.store.clone(),
            self.extractor.clone(),
            cancel.clone(),
        ));

        let mut collected: Vec<(usize, Vec<TransferEvent>)> = Vec::new();
        let mut fatal: Option<SyncError> = None;
        let mut reported = 0usize;
        while let Some((idx, digest, outcome)) = rx.recv().await {
            reported += 1;
            match outcome {
                ItemOutcome::Known => report.skipped_known += 1,
                ItemOutcome::Extracted(events) => {
                    report.processed += 1;
                    report.events_found += events.len() as u64;
                    if !events.is_empty() {
                        debug!(digest = %digest, events = events.len(), "Extracted events");
                        collected.push((idx, events));
                    }
                }
                ItemOutcome::Malformed(reason) => {
                    report.processed += 1;
                    report.malformed += 1;
                    warn!(digest = %digest, reason = %reason, "Skipping transaction with unexpected shape");
                }
                ItemOutcome::Failed(err) => {
                    warn!(digest = %digest, error = %err, "Transaction failed");
                    report.failures.push(BatchFailure::new(digest, &err));
                    if err.is_fatal() && fatal.is_none() {
                        fatal = Some(err);
                    }
                }
            }
        }

        // Channel closed: every spawned task has sent its result or died.
        let panicked = dispatcher
            .await
            .map_err(|e| SyncError::Other(format!("batch dispatcher failed: {e}")))?;
        if panicked > 0 {
            report.failures.push(BatchFailure::new(
                "batch",
                format!("{panicked} extraction task(s) panicked"),
            ));
        }
        report.not_dispatched = (total - reported - panicked) as u64;

        if let Some(err) = fatal {
            return Err(err);
        }

        collected.sort_by_key(|(idx, _)| *idx);
        let merged: Vec<TransferEvent> = collected.into_iter().flat_map(|(_, e)| e).collect();
        let unique = dedup(merged);
        report.events_unique = unique.len() as u64;

        if !unique.is_empty() {
            report.inserted = self.store.insert_batch(&unique).await?;
        }

        info!(
            items = total,
            processed = report.processed,
            known = report.skipped_known,
            failed = report.failed(),
            events = report.events_found,
            unique = report.events_unique,
            inserted = report.inserted,
            workers = self.max_workers,
            "Batch complete"
        );
        Ok(report)
    }
}

/// Spawn one task per item under the semaphore. Returns the number of tasks
/// that panicked.
async fn dispatch(
    items: Vec<BatchItem>,
    results: mpsc::Sender<(usize, String, ItemOutcome)>,
    permits: Arc<Semaphore>,
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn EventStore>,
    extractor: Arc<TransactionExtractor>,
    cancel: CancellationToken,
) -> usize {
    let mut tasks = JoinSet::new();

    for (idx, item) in items.into_iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let permit = tokio::select! {
            permit = permits.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
            _ = cancel.cancelled() => break,
        };
        if cancel.is_cancelled() {
            break;
        }

        let results = results.clone();
        let ledger = ledger.clone();
        let store = store.clone();
        let extractor = extractor.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let digest = item.digest().to_string();
            let outcome = process_item(ledger.as_ref(), store.as_ref(), &extractor, item).await;
            let _ = results.send((idx, digest, outcome)).await;
        });
    }
    drop(results);

    let mut panicked = 0;
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Extraction task aborted");
            panicked += 1;
        }
    }
    panicked
}

async fn process_item(
    ledger: &dyn LedgerClient,
    store: &dyn EventStore,
    extractor: &TransactionExtractor,
    item: BatchItem,
) -> ItemOutcome {
    match store.exists_by_digest(item.digest()).await {
        Ok(true) => return ItemOutcome::Known,
        Ok(false) => {}
        Err(e) => return ItemOutcome::Failed(e),
    }

    let (record, locator) = match item {
        BatchItem::Loaded(record) => (record, None),
        BatchItem::Locator(locator) => match ledger.get_transaction(&locator.digest).await {
            Ok(record) => (record, Some(locator)),
            Err(SyncError::Parse { reason, .. }) => return ItemOutcome::Malformed(reason),
            Err(e) => return ItemOutcome::Failed(e),
        },
    };

    match extractor.extract(&record, locator.as_ref()) {
        Ok(events) => ItemOutcome::Extracted(events),
        Err(SyncError::Parse { reason, .. }) => ItemOutcome::Malformed(reason),
        Err(e) => ItemOutcome::Failed(e),
    }
}
