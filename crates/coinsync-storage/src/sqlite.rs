//! SQLite event store.
//!
//! Persists transfer events to a single SQLite file (or an in-memory
//! database for tests). The `(digest, recipient, amount, kind)` key is a
//! table-level `UNIQUE` constraint and inserts use `INSERT OR IGNORE`, so
//! re-delivered events are absorbed by the database.
//!
//! # Usage
//! ```rust,no_run
//! use coinsync_storage::sqlite::SqliteEventStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteEventStore::open("./coinsync.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteEventStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use coinsync_core::error::SyncError;
use coinsync_core::stats::StatsAccumulator;
use coinsync_core::store::EventStore;
use coinsync_core::types::{timestamp_from_millis, EventKind, TimeWindow, TransferEvent, WindowStatistics};

use crate::{from_db_int, to_db_int};

const EVENT_COLUMNS: &str =
    "digest, sender, recipient, amount, kind, checkpoint, timestamp_ms, success, gas_fee";

/// SQLite-backed [`EventStore`].
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./coinsync.db"`) or a full
    /// SQLite URL (`"sqlite:./coinsync.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, SyncError> {
        Self::open_with(path, 5).await
    }

    pub async fn open_with(path: &str, max_connections: u32) -> Result<Self, SyncError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(&url)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to one connection: every connection to `sqlite::memory:` is a
    /// separate database. All data is lost when the store is dropped.
    pub async fn in_memory() -> Result<Self, SyncError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the events table and its indexes, and enable WAL mode.
    async fn init_schema(&self) -> Result<(), SyncError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transfer_events (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                digest       TEXT    NOT NULL,
                sender       TEXT    NOT NULL,
                recipient    TEXT    NOT NULL,
                amount       TEXT    NOT NULL,
                kind         TEXT    NOT NULL,
                checkpoint   INTEGER NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                success      INTEGER NOT NULL,
                gas_fee      TEXT    NOT NULL,
                UNIQUE (digest, recipient, amount, kind)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        for (name, column) in [
            ("idx_transfer_events_digest", "digest"),
            ("idx_transfer_events_sender", "sender"),
            ("idx_transfer_events_recipient", "recipient"),
            ("idx_transfer_events_timestamp", "timestamp_ms"),
            ("idx_transfer_events_checkpoint", "checkpoint"),
        ] {
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {name} ON transfer_events ({column});"
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        }

        Ok(())
    }
}

fn row_to_event(row: &SqliteRow) -> Result<TransferEvent, SyncError> {
    let kind: String = row.get("kind");
    let timestamp_ms: i64 = row.get("timestamp_ms");
    let timestamp = u64::try_from(timestamp_ms)
        .ok()
        .and_then(timestamp_from_millis)
        .ok_or_else(|| SyncError::Storage(format!("stored timestamp {timestamp_ms} out of range")))?;

    Ok(TransferEvent {
        digest: row.get("digest"),
        sender: row.get("sender"),
        recipient: row.get("recipient"),
        amount: row.get("amount"),
        kind: kind.parse()?,
        checkpoint: from_db_int(row.get("checkpoint"), "checkpoint")?,
        timestamp,
        success: row.get("success"),
        gas_fee: row.get("gas_fee"),
    })
}

// ─── EventStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn insert_batch(&self, events: &[TransferEvent]) -> Result<u64, SyncError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        let mut inserted = 0u64;
        for event in events {
            let result = sqlx::query(&format!(
                "INSERT OR IGNORE INTO transfer_events ({EVENT_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&event.digest)
            .bind(&event.sender)
            .bind(&event.recipient)
            .bind(&event.amount)
            .bind(event.kind.as_str())
            .bind(to_db_int(event.checkpoint, "checkpoint")?)
            .bind(event.timestamp.timestamp_millis())
            .bind(event.success)
            .bind(&event.gas_fee)
            .execute(&mut *tx)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| SyncError::Storage(format!("commit batch: {e}")))?;

        debug!(batch = events.len(), inserted, "events stored");
        Ok(inserted)
    }

    async fn exists_by_digest(&self, digest: &str) -> Result<bool, SyncError> {
        let row = sqlx::query("SELECT 1 AS hit FROM transfer_events WHERE digest = ? LIMIT 1")
            .bind(digest)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn max_checkpoint(&self) -> Result<u64, SyncError> {
        let row = sqlx::query("SELECT COALESCE(MAX(checkpoint), 0) AS cp FROM transfer_events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        from_db_int(row.get("cp"), "checkpoint")
    }

    async fn aggregate(&self, window: &TimeWindow) -> Result<WindowStatistics, SyncError> {
        let rows = sqlx::query(
            "SELECT sender, kind, amount, success FROM transfer_events
             WHERE timestamp_ms >= ? AND timestamp_ms < ?",
        )
        .bind(window.start.timestamp_millis())
        .bind(window.end.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        let mut acc = StatsAccumulator::new(window);
        for row in &rows {
            let kind: EventKind = row.get::<String, _>("kind").parse()?;
            let sender: String = row.get("sender");
            let amount: String = row.get("amount");
            acc.add(&sender, kind, &amount, row.get("success"))?;
        }
        Ok(acc.finish())
    }

    async fn events_by_address(
        &self,
        address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransferEvent>, SyncError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM transfer_events
             WHERE sender = ? OR recipient = ?
             ORDER BY timestamp_ms DESC, digest ASC
             LIMIT ? OFFSET ?"
        ))
        .bind(address)
        .bind(address)
        .bind(to_db_int(limit, "limit")?)
        .bind(to_db_int(offset, "offset")?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        rows.iter().map(row_to_event).collect()
    }

    async fn events_by_digest(&self, digest: &str) -> Result<Vec<TransferEvent>, SyncError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM transfer_events
             WHERE digest = ? ORDER BY recipient, kind"
        ))
        .bind(digest)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Storage(e.to_string()))?;

        rows.iter().map(row_to_event).collect()
    }

    async fn event_count(&self) -> Result<u64, SyncError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM transfer_events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        from_db_int(row.get("cnt"), "count")
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
