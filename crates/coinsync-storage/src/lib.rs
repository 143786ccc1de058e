//! coinsync-storage — durable event stores for coinsync.
//!
//! Backends:
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres` — PostgreSQL via `sqlx` (feature `postgres`)
//!
//! The in-memory store lives in `coinsync_core::store`.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEventStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
use coinsync_core::error::SyncError;

/// Bind-side conversion into a SQL `BIGINT`.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn to_db_int<T>(value: T, what: &str) -> Result<i64, SyncError>
where
    T: TryInto<i64> + Copy + std::fmt::Display,
{
    value.try_into().map_err(|_| {
        SyncError::InvalidArgument(format!("{what} {value} exceeds the database integer range"))
    })
}

/// Read-side conversion of a SQL `BIGINT` that must not be negative.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) fn from_db_int(value: i64, what: &str) -> Result<u64, SyncError> {
    u64::try_from(value).map_err(|_| SyncError::Storage(format!("stored {what} {value} is negative")))
}
