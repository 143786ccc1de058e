//! Batch-level deduplication on the event uniqueness key.

use std::collections::HashSet;

use crate::types::{EventKey, TransferEvent};

/// Drop events whose key already appeared earlier in `events`.
///
/// First occurrence wins; relative order of the survivors is preserved.
pub fn dedup(events: Vec<TransferEvent>) -> Vec<TransferEvent> {
    let mut seen: HashSet<EventKey> = HashSet::with_capacity(events.len());
    events.into_iter().filter(|e| seen.insert(e.key())).collect()
}
