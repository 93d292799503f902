//! Error types for SQLite execution.
//!
//! Provides a unified error type covering database access, query
//! construction, configuration, migrations, caches and the transaction
//! queue.

use std::sync::Arc;

use sqlweave_core::SqlError;
use sqlweave_db::DatabaseError;
use thiserror::Error;

/// Errors that can occur while executing against SQLite.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// A statement could not be built.
    #[error("query error: {0}")]
    Query(#[from] SqlError),

    /// Configuration or schema loading failure.
    #[error("config error: {0}")]
    Config(#[from] DatabaseError),

    /// A migration failed; the version it belongs to was rolled back.
    #[error("migration '{name}' for version {version} failed: {source}")]
    MigrationFailed {
        version: u32,
        name: String,
        #[source]
        source: Box<SqliteError>,
    },

    /// A migration lifecycle step was called out of order.
    #[error("migration lifecycle: {0}")]
    MigrationState(String),

    /// A cache was handed a key it cannot store.
    #[error("cache key error: {0}")]
    CacheKey(String),

    /// A row expected to exist was not found.
    #[error("row not found in {0}")]
    RowNotFound(String),

    /// The transaction queue is shut down or its worker is gone.
    #[error("queue error: {0}")]
    Queue(String),

    /// A queued unit failed; shared between its error callback and waiters.
    #[error("transaction failed: {0}")]
    Transaction(Arc<SqliteError>),

    /// A queued unit was cancelled or skipped before it ran.
    #[error("transaction cancelled")]
    Cancelled,
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
