//! Event store contract and an in-memory implementation.
//!
//! Durable backends live in `coinsync-storage`. Every backend enforces the
//! `(digest, recipient, amount, kind)` uniqueness key itself and treats a
//! colliding insert as already done.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::stats::StatsAccumulator;
use crate::types::{EventKey, TimeWindow, TransferEvent, WindowStatistics};

/// Persistence for classified transfer events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert `events` as one unit; rows whose key already exists are skipped.
    /// Returns the number of rows actually inserted.
    async fn insert_batch(&self, events: &[TransferEvent]) -> Result<u64, SyncError>;

    async fn exists_by_digest(&self, digest: &str) -> Result<bool, SyncError>;

    /// Highest stored checkpoint, `0` when empty.
    async fn max_checkpoint(&self) -> Result<u64, SyncError>;

    async fn aggregate(&self, window: &TimeWindow) -> Result<WindowStatistics, SyncError>;

    /// Events where `address` is sender or recipient, newest first
    /// (ties broken by digest).
    async fn events_by_address(
        &self,
        address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransferEvent>, SyncError>;

    /// All events of one transaction, ordered by recipient then kind.
    async fn events_by_digest(&self, digest: &str) -> Result<Vec<TransferEvent>, SyncError>;

    async fn event_count(&self) -> Result<u64, SyncError>;
}

// ─── In-memory store ─────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    events: Vec<TransferEvent>,
    keys: HashMap<EventKey, usize>,
}

/// In-memory event store for tests and throwaway runs.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryEventStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, SyncError> {
        self.inner
            .lock()
            .map_err(|_| SyncError::Storage("memory store lock poisoned".into()))
    }

    /// Snapshot of every stored event in insertion order.
    pub fn all(&self) -> Result<Vec<TransferEvent>, SyncError> {
        Ok(self.lock()?.events.clone())
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_batch(&self, events: &[TransferEvent]) -> Result<u64, SyncError> {
        let mut inner = self.lock()?;
        let mut inserted = 0u64;
        for event in events {
            let key = event.key();
            if inner.keys.contains_key(&key) {
                continue;
            }
            let idx = inner.events.len();
            inner.events.push(event.clone());
            inner.keys.insert(key, idx);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn exists_by_digest(&self, digest: &str) -> Result<bool, SyncError> {
        Ok(self.lock()?.events.iter().any(|e| e.digest == digest))
    }

    async fn max_checkpoint(&self) -> Result<u64, SyncError> {
        Ok(self.lock()?.events.iter().map(|e| e.checkpoint).max().unwrap_or(0))
    }

    async fn aggregate(&self, window: &TimeWindow) -> Result<WindowStatistics, SyncError> {
        let inner = self.lock()?;
        let mut acc = StatsAccumulator::new(window);
        for e in inner.events.iter().filter(|e| window.contains(e.timestamp)) {
            acc.add(&e.sender, e.kind, &e.amount, e.success)?;
        }
        Ok(acc.finish())
    }

    async fn events_by_address(
        &self,
        address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransferEvent>, SyncError> {
        let inner = self.lock()?;
        let mut matched: Vec<&TransferEvent> =
            inner.events.iter().filter(|e| e.involves(address)).collect();
        matched.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.digest.cmp(&b.digest))
        });
        Ok(matched.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn events_by_digest(&self, digest: &str) -> Result<Vec<TransferEvent>, SyncError> {
        let inner = self.lock()?;
        let mut out: Vec<TransferEvent> =
            inner.events.iter().filter(|e| e.digest == digest).cloned().collect();
        out.sort_by(|a, b| a.recipient.cmp(&b.recipient).then_with(|| a.kind.as_str().cmp(b.kind.as_str())));
        Ok(out)
    }

    async fn event_count(&self) -> Result<u64, SyncError> {
        Ok(self.lock()?.events.len() as u64)
    }
}
