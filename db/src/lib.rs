//! Table definition loading and database configuration.
//!
//! This crate reads table metadata from files (one table per JSON or YAML
//! file, or a single bundle holding many) and the YAML settings used when
//! opening a database.
//!
//! # Quick start
//!
//! ```no_run
//! use sqlweave_db::{DatabaseConfig, SchemaSet};
//!
//! let config = DatabaseConfig::load("sqlweave.yml").unwrap();
//!
//! // Use the builder for fallback chains
//! let set = SchemaSet::builder()
//!     .from_dir("schema/")
//!     .from_bundle("schema.json")
//!     .build()
//!     .unwrap();
//!
//! let registry = set.into_registry(Default::default()).unwrap();
//! println!("{} tables for {}", registry.len(), config.name);
//! ```

mod config;
mod error;
mod loader;

pub use config::{DatabaseConfig, JournalMode, QueueConfig};
pub use error::{DatabaseError, Result};
pub use loader::{SchemaSet, SchemaSetBuilder, SchemaSource};
