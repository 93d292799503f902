//! Error types for loading table definitions and configuration.
//!
//! Covers I/O, JSON and YAML failures, invalid configuration values, and
//! table definitions the core registry refuses.

use sqlweave_core::SqlError;
use thiserror::Error;

/// Errors that can occur while loading schema files or configuration.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A configuration value is out of range or missing.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A schema file has an extension other than json, yaml or yml.
    #[error("unsupported schema file format: {0}")]
    UnsupportedFormat(String),

    /// All configured loader sources failed.
    #[error("no schema sources available")]
    NoSourcesAvailable,

    /// A loaded table definition was rejected.
    #[error("schema error: {0}")]
    SchemaError(#[from] SqlError),
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;
