//! Table metadata.
//!
//! A [`Table`] describes columns, the primary key, foreign keys, declared
//! indexes, caching and conflict policies. Tables are plain serde values so
//! they can be written by hand in Rust or loaded from JSON / YAML files.
//!
//! # Examples
//!
//! ```
//! use sqlweave_core::*;
//!
//! let table = Table::new("IndexModel")
//!     .column(Column::new("id", SqlType::Integer).auto_increment())
//!     .column(Column::new("name", SqlType::Text))
//!     .column(Column::new("salary", SqlType::Integer));
//!
//! assert_eq!(table.primary_key(), Some(PrimaryKey::AutoIncrement("id".into())));
//! assert_eq!(
//!     table.create_query().unwrap(),
//!     "CREATE TABLE IF NOT EXISTS `IndexModel`(`id` INTEGER PRIMARY KEY AUTOINCREMENT, `name` TEXT, `salary` INTEGER)"
//! );
//! ```

use serde::{Deserialize, Serialize};

use crate::builder::{QueryBuilder, quote};
use crate::converter::ConverterRegistry;
use crate::error::Result;
use crate::query::SchemaObject;
use crate::statement::Index;
use crate::value::{Collate, ConflictAction, SqlType};

/// A column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    #[serde(default)]
    pub primary_key: bool,
    /// Implies `primary_key`; only valid on a lone INTEGER key.
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_null: Option<ConflictAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<ConflictAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Default value as SQL text, e.g. `0` or `'none'`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collate: Option<Collate>,
    /// Name of a registered type converter for this column's values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            primary_key: false,
            auto_increment: false,
            not_null: None,
            unique: None,
            length: None,
            default: None,
            collate: None,
            converter: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.primary_key = true;
        self.auto_increment = true;
        self
    }

    pub fn not_null(mut self, on_conflict: ConflictAction) -> Self {
        self.not_null = Some(on_conflict);
        self
    }

    pub fn unique(mut self, on_conflict: ConflictAction) -> Self {
        self.unique = Some(on_conflict);
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn default_value(mut self, sql: impl Into<String>) -> Self {
        self.default = Some(sql.into());
        self
    }

    pub fn collate(mut self, collate: Collate) -> Self {
        self.collate = Some(collate);
        self
    }

    pub fn converter(mut self, name: impl Into<String>) -> Self {
        self.converter = Some(name.into());
        self
    }

    pub fn is_key(&self) -> bool {
        self.primary_key || self.auto_increment
    }

    /// The column's fragment inside `CREATE TABLE`.
    pub fn definition(&self) -> String {
        let mut qb = QueryBuilder::new();
        qb.append_quoted(&self.name)
            .append_space()
            .append_sql_type(self.sql_type);
        if let Some(length) = self.length {
            qb.append("(").append(length).append(")");
        }
        if self.auto_increment {
            qb.append(" PRIMARY KEY AUTOINCREMENT");
        }
        if let Some(action) = self.not_null {
            qb.append(" NOT NULL ON CONFLICT ").append(action.as_sql());
        }
        if let Some(action) = self.unique {
            qb.append(" UNIQUE ON CONFLICT ").append(action.as_sql());
        }
        qb.append_optional(self.default.as_ref().map(|d| format!(" DEFAULT {d}")))
            .append_optional(self.collate.map(|c| format!(" COLLATE {}", c.as_sql())));
        qb.into_query()
    }
}

/// The primary key of a validated table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimaryKey {
    AutoIncrement(String),
    Columns(Vec<String>),
}

impl PrimaryKey {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKey::AutoIncrement(column) => vec![column.as_str()],
            PrimaryKey::Columns(columns) => columns.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_auto_increment(&self) -> bool {
        matches!(self, PrimaryKey::AutoIncrement(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    SetNull,
    SetDefault,
    Cascade,
}

impl ForeignKeyAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
            ForeignKeyAction::Cascade => "CASCADE",
        }
    }
}

/// Maps a local column to a column of the referenced table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyReference {
    pub column: String,
    pub foreign_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// The referenced table.
    pub table: String,
    pub references: Vec<ForeignKeyReference>,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    #[serde(default)]
    pub on_update: ForeignKeyAction,
    /// Save the referenced model before the referencing one.
    #[serde(default)]
    pub save_cascade: bool,
    #[serde(default)]
    pub deferred: bool,
}

impl ForeignKey {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            references: Vec::new(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
            save_cascade: false,
            deferred: false,
        }
    }

    pub fn reference(mut self, column: impl Into<String>, foreign_column: impl Into<String>) -> Self {
        self.references.push(ForeignKeyReference {
            column: column.into(),
            foreign_column: foreign_column.into(),
        });
        self
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }

    pub fn save_cascade(mut self) -> Self {
        self.save_cascade = true;
        self
    }

    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    fn definition(&self) -> String {
        let mut qb = QueryBuilder::with("FOREIGN KEY(");
        qb.append_quoted_list(self.references.iter().map(|r| r.column.as_str()))
            .append(") REFERENCES ")
            .append_quoted(&self.table)
            .append("(")
            .append_quoted_list(self.references.iter().map(|r| r.foreign_column.as_str()))
            .append(")")
            .append(" ON UPDATE ")
            .append(self.on_update.as_sql())
            .append(" ON DELETE ")
            .append(self.on_delete.as_sql());
        if self.deferred {
            qb.append(" DEFERRABLE INITIALLY DEFERRED");
        }
        qb.into_query()
    }
}

/// An index declared with the table and created alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexGroup {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CacheKind {
    #[default]
    Lru,
    Map,
    Sparse,
}

/// Model caching for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_size")]
    pub size: usize,
    #[serde(default)]
    pub kind: CacheKind,
}

fn default_cache_size() -> usize {
    CacheConfig::DEFAULT_SIZE
}

impl CacheConfig {
    pub const DEFAULT_SIZE: usize = 25;

    pub fn enabled(kind: CacheKind, size: usize) -> Self {
        Self {
            enabled: true,
            size,
            kind,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size: Self::DEFAULT_SIZE,
            kind: CacheKind::Lru,
        }
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Logical database the table belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexGroup>,
    /// Model caching; `None` leaves the choice to the database default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_conflict: Option<ConflictAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_conflict: Option<ConflictAction>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: None,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            cache: None,
            insert_conflict: None,
            update_conflict: None,
        }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    pub fn index<I, S>(mut self, name: impl Into<String>, columns: I, unique: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes.push(IndexGroup {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique,
        });
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn insert_conflict(mut self, action: ConflictAction) -> Self {
        self.insert_conflict = Some(action);
        self
    }

    pub fn update_conflict(mut self, action: ConflictAction) -> Self {
        self.update_conflict = Some(action);
        self
    }

    pub fn column_named(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The derived primary key, or `None` when no column is a key.
    ///
    /// An auto-increment column wins over any other key columns; validation
    /// rejects that combination before a table is registered.
    pub fn primary_key(&self) -> Option<PrimaryKey> {
        if let Some(column) = self.columns.iter().find(|c| c.auto_increment) {
            return Some(PrimaryKey::AutoIncrement(column.name.clone()));
        }
        let keys: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        (!keys.is_empty()).then_some(PrimaryKey::Columns(keys))
    }

    /// Whether the primary key is a single INTEGER column, the only key
    /// shape the LRU and sparse caches can index.
    pub fn has_integer_key(&self) -> bool {
        match self.primary_key() {
            Some(PrimaryKey::AutoIncrement(_)) => true,
            Some(PrimaryKey::Columns(columns)) => match columns.as_slice() {
                [single] => self
                    .column_named(single)
                    .is_some_and(|c| c.sql_type == SqlType::Integer),
                _ => false,
            },
            None => false,
        }
    }

    /// Names of every table this one references, without duplicates.
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for fk in &self.foreign_keys {
            if !names.contains(&fk.table.as_str()) {
                names.push(&fk.table);
            }
        }
        names
    }

    /// The declared index groups as index statements.
    pub fn index_statements(&self) -> Vec<Index> {
        self.indexes
            .iter()
            .map(|group| {
                Index::new(&group.name)
                    .on(&self.name, &group.columns)
                    .unique(group.unique)
            })
            .collect()
    }
}

impl SchemaObject for Table {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_query_with(&self, _converters: &ConverterRegistry) -> Result<String> {
        let mut parts: Vec<String> = self.columns.iter().map(Column::definition).collect();
        if let Some(PrimaryKey::Columns(columns)) = self.primary_key() {
            let quoted: Vec<String> = columns.iter().map(|c| quote(c)).collect();
            parts.push(format!("PRIMARY KEY({})", quoted.join(", ")));
        }
        parts.extend(self.foreign_keys.iter().map(ForeignKey::definition));

        let mut qb = QueryBuilder::with("CREATE TABLE IF NOT EXISTS ");
        qb.append_quoted(&self.name)
            .append("(")
            .append_array(&parts)
            .append(")");
        Ok(qb.into_query())
    }

    fn drop_query(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", quote(&self.name))
    }
}
