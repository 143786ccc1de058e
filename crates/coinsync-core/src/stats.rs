//! Windowed statistics.
//!
//! [`StatsAccumulator`] is the reference fold shared by the Rust-side store
//! backends; [`StatisticsAggregator`] is the read-path entry point.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::SyncError;
use crate::store::EventStore;
use crate::types::{EventKind, TimeWindow, WindowStatistics};

// ─── Accumulator ─────────────────────────────────────────────────────────────

/// Folds rows already filtered to a window into [`WindowStatistics`].
pub struct StatsAccumulator {
    stats: WindowStatistics,
    senders: HashSet<String>,
}

impl StatsAccumulator {
    pub fn new(window: &TimeWindow) -> Self {
        Self {
            stats: WindowStatistics::empty(window),
            senders: HashSet::new(),
        }
    }

    pub fn add(
        &mut self,
        sender: &str,
        kind: EventKind,
        amount: &str,
        success: bool,
    ) -> Result<(), SyncError> {
        if !self.senders.contains(sender) {
            self.senders.insert(sender.to_string());
        }
        if !success {
            return Ok(());
        }
        let amount: Decimal = amount
            .trim()
            .parse()
            .map_err(|e| SyncError::Storage(format!("stored amount '{amount}' is not a decimal: {e}")))?;
        *self.stats.total_mut(kind) += amount.abs();
        self.stats.total_tx_count += 1;
        Ok(())
    }

    pub fn finish(mut self) -> WindowStatistics {
        self.stats.unique_holders = self.senders.len() as u64;
        self.stats
    }
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

/// Fixed query patterns over [`EventStore::aggregate`].
#[derive(Clone)]
pub struct StatisticsAggregator {
    store: Arc<dyn EventStore>,
}

impl StatisticsAggregator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// `[start, end)`; rejects `start >= end`.
    pub async fn window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowStatistics, SyncError> {
        let window = TimeWindow::new(start, end)?;
        self.store.aggregate(&window).await
    }

    /// Trailing seven days ending at `now`.
    pub async fn weekly_at(&self, now: DateTime<Utc>) -> Result<WindowStatistics, SyncError> {
        self.store.aggregate(&TimeWindow::trailing_days(now, 7)).await
    }

    pub async fn weekly(&self) -> Result<WindowStatistics, SyncError> {
        self.weekly_at(Utc::now()).await
    }

    pub async fn all_time(&self) -> Result<WindowStatistics, SyncError> {
        self.store.aggregate(&TimeWindow::all_time(Utc::now())).await
    }
}
