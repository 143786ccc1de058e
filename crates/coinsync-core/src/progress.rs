//! Resume watermark.
//!
//! The watermark is never stored on its own: it is `max(checkpoint)` over the
//! persisted events, so it cannot drift from the data it describes.

use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::error::SyncError;
use crate::store::EventStore;

pub struct ProgressStore {
    store: Arc<dyn EventStore>,
    /// Lowest checkpoint ever scanned.
    floor: u64,
}

impl ProgressStore {
    pub fn new(store: Arc<dyn EventStore>, floor: u64) -> Self {
        Self { store, floor }
    }

    /// Highest checkpoint with at least one stored event (`0` when empty).
    pub async fn watermark(&self) -> Result<u64, SyncError> {
        self.store.max_checkpoint().await
    }

    /// The range still to scan given the ledger head, or `None` when caught up.
    pub async fn next_range(&self, latest: u64) -> Result<Option<RangeInclusive<u64>>, SyncError> {
        let watermark = self.watermark().await?;
        Ok(pending_range(watermark, self.floor, latest))
    }
}

/// `[max(watermark + 1, floor), latest]`, or `None` when that range is empty.
pub fn pending_range(watermark: u64, floor: u64, latest: u64) -> Option<RangeInclusive<u64>> {
    let start = watermark.saturating_add(1).max(floor);
    (start <= latest).then_some(start..=latest)
}

/// Split `range` into consecutive chunks of at most `size` checkpoints.
pub fn sub_batches(range: RangeInclusive<u64>, size: u64) -> Vec<RangeInclusive<u64>> {
    let size = size.max(1);
    let (mut start, end) = (*range.start(), *range.end());
    let mut out = Vec::new();
    while start <= end {
        let stop = start.saturating_add(size - 1).min(end);
        out.push(start..=stop);
        if stop == u64::MAX {
            break;
        }
        start = stop + 1;
    }
    out
}
