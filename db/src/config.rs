//! Database configuration.
//!
//! Defines the YAML-serializable settings used when opening a database: its
//! name and schema version, SQLite pragmas, where versioned SQL migrations
//! live, the batch save queue tuning and the default model cache.
//!
//! # Example YAML
//!
//! ```yaml
//! name: company
//! version: 3
//! foreign_keys: true
//! journal_mode: Wal
//! migrations_dir: migrations
//! queue:
//!   batch_size: 50
//!   idle_timeout_ms: 30000
//! cache:
//!   enabled: true
//!   size: 100
//!   kind: Lru
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlweave_core::CacheConfig;

use crate::error::{DatabaseError, Result};

/// SQLite `journal_mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        }
    }
}

/// Tuning for the batch save queue.
///
/// # Examples
///
/// ```
/// # use sqlweave_db::QueueConfig;
/// let q = QueueConfig::default();
/// assert_eq!(q.batch_size, 50);
/// assert_eq!(q.idle_timeout().as_secs(), 30);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Pending saves that trigger an immediate flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Flush after this long without a new save.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

fn default_batch_size() -> usize {
    QueueConfig::DEFAULT_BATCH_SIZE
}

fn default_idle_timeout_ms() -> u64 {
    QueueConfig::DEFAULT_IDLE_TIMEOUT_MS
}

impl QueueConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 50;
    pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            idle_timeout_ms: Self::DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Settings for one logical database.
///
/// # Examples
///
/// ```no_run
/// use sqlweave_db::DatabaseConfig;
///
/// let config = DatabaseConfig::load("sqlweave.yml").unwrap();
/// println!("{} at schema version {}", config.name, config.version);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Logical database name.
    pub name: String,
    /// Target schema version; migrations run up to and including it.
    pub version: u32,
    /// Whether `PRAGMA foreign_keys` is switched on at open.
    #[serde(default = "default_true")]
    pub foreign_keys: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_mode: Option<JournalMode>,
    /// Directory holding `<version>.sql` migration files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrations_dir: Option<PathBuf>,
    #[serde(default)]
    pub queue: QueueConfig,
    /// Cache settings for tables that do not declare their own.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            foreign_keys: true,
            journal_mode: None,
            migrations_dir: None,
            queue: QueueConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be read, [`YamlError`](crate::DatabaseError::YamlError) if parsing
    /// fails, or [`InvalidConfig`](crate::DatabaseError::InvalidConfig) if a
    /// value is out of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be written, or [`YamlError`](crate::DatabaseError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DatabaseError::InvalidConfig("name cannot be empty".into()));
        }
        if self.queue.batch_size == 0 {
            return Err(DatabaseError::InvalidConfig(
                "queue.batch_size must be at least 1".into(),
            ));
        }
        if self.cache.enabled && self.cache.size == 0 {
            return Err(DatabaseError::InvalidConfig(
                "cache.size must be at least 1 when caching is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Resolves `migrations_dir` against the directory of the config file.
    pub fn migrations_dir_from(&self, config_path: &Path) -> Option<PathBuf> {
        let dir = self.migrations_dir.as_ref()?;
        if dir.is_absolute() {
            return Some(dir.clone());
        }
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        Some(base.join(dir))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("main", 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlweave_core::CacheKind;

    fn sample_yaml() -> &'static str {
        r#"
name: company
version: 3
foreign_keys: false
journal_mode: Wal
migrations_dir: migrations
queue:
  batch_size: 10
  idle_timeout_ms: 500
cache:
  enabled: true
  size: 100
  kind: Map
"#
    }

    #[test]
    fn test_deserialize_complete() {
        let config = DatabaseConfig::from_yaml_str(sample_yaml()).unwrap();
        assert_eq!(config.name, "company");
        assert_eq!(config.version, 3);
        assert!(!config.foreign_keys);
        assert_eq!(config.journal_mode, Some(JournalMode::Wal));
        assert_eq!(config.queue.batch_size, 10);
        assert_eq!(config.queue.idle_timeout(), Duration::from_millis(500));
        assert_eq!(config.cache.kind, CacheKind::Map);
    }

    #[test]
    fn test_deserialize_minimal() {
        let config = DatabaseConfig::from_yaml_str("name: app\nversion: 1\n").unwrap();
        assert!(config.foreign_keys);
        assert_eq!(config.journal_mode, None);
        assert_eq!(config.queue, QueueConfig::default());
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            DatabaseConfig::from_yaml_str("name: ''\nversion: 1\n"),
            Err(DatabaseError::InvalidConfig(_))
        ));
        assert!(matches!(
            DatabaseConfig::from_yaml_str("name: a\nversion: 1\nqueue:\n  batch_size: 0\n"),
            Err(DatabaseError::InvalidConfig(_))
        ));
        assert!(matches!(
            DatabaseConfig::from_yaml_str("name: a\nversion: one\n"),
            Err(DatabaseError::YamlError(_))
        ));
    }

    #[test]
    fn test_migrations_dir_relative_to_config() {
        let config = DatabaseConfig::from_yaml_str(sample_yaml()).unwrap();
        assert_eq!(
            config.migrations_dir_from(Path::new("/etc/app/db.yml")),
            Some(PathBuf::from("/etc/app/migrations"))
        );
        assert_eq!(DatabaseConfig::default().migrations_dir_from(Path::new("x")), None);
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.yml");

        let original = DatabaseConfig::from_yaml_str(sample_yaml()).unwrap();
        original.save(&path).unwrap();

        let loaded = DatabaseConfig::load(&path).unwrap();
        assert_eq!(loaded, original);
    }
}
