//! SQLite execution backend for sqlweave.
//!
//! This crate runs the statements built by
//! [`sqlweave_core`](sqlweave_core) against SQLite through `rusqlite`.
//!
//! # Architecture
//!
//! - **`database`**: open/create/upgrade a database, parameterized
//!   execution, savepoint transactions
//! - **`migration`**: versioned migrations with pre/migrate/post lifecycle
//! - **`model`**: typed insert/update/save/delete/load for [`Model`] types
//! - **`cache`**: LRU, map and sparse model caches keyed by primary key
//! - **`queue`**: a prioritized single-worker transaction queue
//! - **`batch`**: coalesces individual saves into batched transactions
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sqlweave_core::SqlType;
//! use sqlweave_db::SchemaSet;
//! use sqlweave_sqlite::{AlterTableMigration, Database, Migrations};
//!
//! let registry = SchemaSet::from_dir("schemas/")
//!     .unwrap()
//!     .into_registry(Default::default())
//!     .unwrap();
//!
//! let mut migrations = Migrations::new();
//! migrations.add(
//!     2,
//!     0,
//!     AlterTableMigration::new("Employee").add_column(SqlType::Text, "email"),
//! );
//!
//! let db = Database::builder(Arc::new(registry))
//!     .migrations(migrations)
//!     .open("app.db")
//!     .unwrap();
//! println!("schema version {}", db.version().unwrap());
//! ```
//!
//! [`Model`]: sqlweave_core::Model

mod batch;
mod cache;
mod convert;
mod database;
mod error;
mod migration;
mod model;
mod queue;

pub use batch::{BatchSaveQueue, BatchSaveQueueBuilder};
pub use cache::{
    CacheKey, CompositeKeyFn, LruModelCache, ModelCache, SimpleMapCache, SparseArrayCache,
    cache_for, composite_cache_key,
};
pub use convert::{from_value, to_value};
pub use database::{Database, DatabaseBuilder, Row};
pub use error::{Result, SqliteError};
pub use migration::{
    AlterTableMigration, IndexMigration, Migration, MigrationLifecycle, MigrationPhase,
    Migrations, SqlMigration, UpdateTableMigration,
};
pub use model::ModelAdapter;
pub use queue::{
    Callback, CallbackExecutor, ChannelExecutor, Priority, QueueManager, TransactionBuilder,
    TransactionHandle, TransactionQueue, WorkerExecutor,
};
