//! Table definition loading with builder pattern and fallback chains.
//!
//! Provides [`SchemaSet`] for the table definitions of one database and
//! [`SchemaSetBuilder`] for loading them from several sources with automatic
//! fallback.
//!
//! # Loading patterns
//!
//! ```no_run
//! use sqlweave_db::SchemaSet;
//!
//! // One table per file: *.json, *.yaml or *.yml
//! let set = SchemaSet::from_dir("schema/").unwrap();
//! assert!(set.get("Employee").is_some());
//!
//! // A single file holding a list of tables
//! let set = SchemaSet::from_bundle("schema.json").unwrap();
//!
//! // First source that loads wins
//! let set = SchemaSet::builder()
//!     .from_dir("schema/")
//!     .from_bundle("schema.json")
//!     .build()
//!     .unwrap();
//!
//! let registry = set.into_registry(Default::default()).unwrap();
//! ```

use std::path::{Path, PathBuf};

use sqlweave_core::{ConverterRegistry, Registry, Table};

use crate::error::{DatabaseError, Result};

/// Describes where a [`SchemaSet`] was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// A directory with one table definition per file.
    Directory(PathBuf),
    /// A single file holding a list of tables.
    Bundle(PathBuf),
    /// Built in code.
    Inline,
    /// Loaded via a fallback chain of multiple sources.
    Multiple(Vec<SchemaSource>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

fn format_of(path: &Path) -> Option<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Some(Format::Json),
        Some("yaml" | "yml") => Some(Format::Yaml),
        _ => None,
    }
}

fn read_file<T: serde::de::DeserializeOwned>(path: &Path, format: Format) -> Result<T> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let value = match format {
        Format::Json => serde_json::from_reader(reader)?,
        Format::Yaml => serde_yaml::from_reader(reader)?,
    };
    Ok(value)
}

/// The table definitions of one database, in load order.
///
/// # Examples
///
/// ```
/// use sqlweave_core::{Column, SqlType, Table};
/// use sqlweave_db::SchemaSet;
///
/// let mut set = SchemaSet::new();
/// set.insert(Table::new("Tag").column(Column::new("id", SqlType::Integer).auto_increment()));
/// assert!(set.contains("Tag"));
/// assert_eq!(set.names().collect::<Vec<_>>(), ["Tag"]);
/// ```
#[derive(Debug, Clone)]
pub struct SchemaSet {
    tables: Vec<Table>,
    source: SchemaSource,
}

impl Default for SchemaSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaSet {
    /// An empty set for tables defined in code.
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            source: SchemaSource::Inline,
        }
    }

    /// Returns a new [`SchemaSetBuilder`] for configuring a fallback chain.
    pub fn builder() -> SchemaSetBuilder {
        SchemaSetBuilder::new()
    }

    /// Loads one table per `*.json`, `*.yaml` or `*.yml` file, in file name
    /// order. Other files are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::IoError`] if the directory cannot be read,
    /// or a JSON / YAML error if any table file fails to parse.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut files: Vec<(PathBuf, Format)> = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let file_path = entry?.path();
            if let Some(format) = format_of(&file_path) {
                files.push((file_path, format));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut set = Self::new();
        for (file_path, format) in files {
            let table: Table = read_file(&file_path, format)?;
            tracing::debug!(table = %table.name, path = %file_path.display(), "loaded table definition");
            set.insert(table);
        }
        set.source = SchemaSource::Directory(path.to_path_buf());
        Ok(set)
    }

    /// Loads a list of tables from one JSON or YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::UnsupportedFormat`] for other extensions,
    /// [`DatabaseError::IoError`] if the file cannot be read, or a JSON /
    /// YAML error if parsing fails.
    pub fn from_bundle(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = format_of(path)
            .ok_or_else(|| DatabaseError::UnsupportedFormat(path.display().to_string()))?;
        let tables: Vec<Table> = read_file(path, format)?;

        let mut set = Self::new();
        for table in tables {
            set.insert(table);
        }
        set.source = SchemaSource::Bundle(path.to_path_buf());
        Ok(set)
    }

    /// Adds a table, replacing any existing table with the same name in place.
    pub fn insert(&mut self, table: Table) {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn source(&self) -> &SchemaSource {
        &self.source
    }

    /// Writes the set as one bundle file (JSON or YAML by extension).
    pub fn save_bundle(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let format = format_of(path)
            .ok_or_else(|| DatabaseError::UnsupportedFormat(path.display().to_string()))?;
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        match format {
            Format::Json => serde_json::to_writer_pretty(writer, &self.tables)?,
            Format::Yaml => serde_yaml::to_writer(writer, &self.tables)?,
        }
        Ok(())
    }

    /// Validates and registers every table.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::SchemaError`] for the first table the
    /// registry refuses.
    pub fn into_registry(self, converters: ConverterRegistry) -> Result<Registry> {
        let mut registry = Registry::new(converters);
        for table in self.tables {
            registry.register_table(table)?;
        }
        Ok(registry)
    }
}

/// Builder for loading a [`SchemaSet`] with a fallback chain.
///
/// Sources are tried in the order they are added. The first successful load
/// wins; if all fail, [`DatabaseError::NoSourcesAvailable`] is returned.
pub struct SchemaSetBuilder {
    sources: Vec<SchemaSource>,
}

impl SchemaSetBuilder {
    /// Creates a new builder with no sources.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Adds a directory of table files as a source.
    pub fn from_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(SchemaSource::Directory(path.into()));
        self
    }

    /// Adds a bundle file as a source.
    pub fn from_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(SchemaSource::Bundle(path.into()));
        self
    }

    /// Attempts to load from configured sources in order.
    pub fn build(self) -> Result<SchemaSet> {
        if self.sources.is_empty() {
            return Err(DatabaseError::NoSourcesAvailable);
        }

        let all_sources = self.sources.clone();

        for source in &self.sources {
            let result = match source {
                SchemaSource::Directory(path) => SchemaSet::from_dir(path),
                SchemaSource::Bundle(path) => SchemaSet::from_bundle(path),
                SchemaSource::Inline | SchemaSource::Multiple(_) => continue,
            };

            match result {
                Ok(mut set) => {
                    set.source = SchemaSource::Multiple(all_sources);
                    return Ok(set);
                }
                Err(err) => tracing::warn!(?source, error = %err, "schema source failed"),
            }
        }

        Err(DatabaseError::NoSourcesAvailable)
    }
}

impl Default for SchemaSetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlweave_core::{Column, SqlType};
    use std::io::Write;

    fn table(name: &str) -> Table {
        Table::new(name)
            .column(Column::new("id", SqlType::Integer).auto_increment())
            .column(Column::new("label", SqlType::Text))
    }

    fn write_json(dir: &Path, table: &Table) {
        let path = dir.join(format!("{}.json", table.name));
        let mut f = std::fs::File::create(path).unwrap();
        serde_json::to_writer_pretty(&mut f, table).unwrap();
        f.flush().unwrap();
    }

    #[test]
    fn test_from_dir_mixed_formats() {
        let dir = tempfile::tempdir().unwrap();
        write_json(dir.path(), &table("B"));
        std::fs::write(
            dir.path().join("A.yaml"),
            "name: A\ncolumns:\n  - name: id\n    type: Integer\n    auto_increment: true\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = SchemaSet::from_dir(dir.path()).unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), ["A", "B"]);
        assert_eq!(set.source(), &SchemaSource::Directory(dir.path().to_path_buf()));
    }

    #[test]
    fn test_from_dir_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        assert!(matches!(
            SchemaSet::from_dir(dir.path()),
            Err(DatabaseError::JsonError(_))
        ));
    }

    #[test]
    fn test_bundle_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.yml");

        let mut set = SchemaSet::new();
        set.insert(table("Tag"));
        set.insert(table("Post"));
        set.save_bundle(&path).unwrap();

        let loaded = SchemaSet::from_bundle(&path).unwrap();
        assert_eq!(loaded.tables(), set.tables());
    }

    #[test]
    fn test_bundle_unsupported_extension() {
        assert!(matches!(
            SchemaSet::from_bundle("tables.toml"),
            Err(DatabaseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut set = SchemaSet::new();
        set.insert(table("A"));
        set.insert(table("B"));
        set.insert(table("A").column(Column::new("extra", SqlType::Real)));
        assert_eq!(set.names().collect::<Vec<_>>(), ["A", "B"]);
        assert_eq!(set.get("A").unwrap().columns.len(), 3);
    }

    #[test]
    fn test_builder_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("bundle.json");
        let mut set = SchemaSet::new();
        set.insert(table("Docker"));
        set.save_bundle(&bundle).unwrap();

        let loaded = SchemaSet::builder()
            .from_dir("/nonexistent/dir/")
            .from_bundle(&bundle)
            .build()
            .unwrap();
        assert!(loaded.contains("Docker"));
        assert!(matches!(loaded.source(), SchemaSource::Multiple(s) if s.len() == 2));
    }

    #[test]
    fn test_builder_all_fail() {
        let result = SchemaSet::builder()
            .from_dir("/nonexistent/dir1/")
            .from_bundle("/nonexistent/bundle1.json")
            .build();
        assert!(matches!(result, Err(DatabaseError::NoSourcesAvailable)));
    }

    #[test]
    fn test_into_registry_rejects_invalid() {
        let mut set = SchemaSet::new();
        set.insert(table("Good"));
        set.insert(Table::new("Bad").column(Column::new("x", SqlType::Text)));
        assert!(matches!(
            set.into_registry(ConverterRegistry::default()),
            Err(DatabaseError::SchemaError(_))
        ));
    }
}
