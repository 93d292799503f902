//! Table definition validation.
//!
//! Catches configuration errors (missing primary keys, auto-increment keys
//! mixed with other key columns, foreign keys without references, ...)
//! before a table is registered and any SQL is generated.
//!
//! # Examples
//!
//! ```
//! use sqlweave_core::*;
//!
//! let table = Table::new("Employee")
//!     .column(Column::new("id", SqlType::Integer).auto_increment())
//!     .column(Column::new("name", SqlType::Text));
//! assert!(validate_table(&table).is_empty());
//!
//! // No key column at all
//! let bad = Table::new("Employee").column(Column::new("name", SqlType::Text));
//! assert_eq!(
//!     validate_table(&bad),
//!     vec![ValidationError::MissingPrimaryKey("Employee".into())]
//! );
//! ```

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::table::{CacheKind, Table};
use crate::value::SqlType;

/// Table validation errors.
///
/// Each variant describes one structural problem. A table with any of them
/// cannot be registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Table name is empty or whitespace-only.
    #[error("table name cannot be empty")]
    EmptyTableName,
    /// A table, column or index name is not a plain SQL identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// The table declares no columns.
    #[error("table {0} has no columns")]
    NoColumns(String),
    /// Two columns share a name.
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),
    /// No column is part of the primary key.
    #[error("table {0} has no primary key")]
    MissingPrimaryKey(String),
    /// An auto-increment column is combined with other key columns.
    #[error("table {0} mixes an auto-increment key with other primary key columns")]
    AutoIncrementWithCompositeKey(String),
    /// More than one column is auto-increment.
    #[error("table {0} has more than one auto-increment column")]
    MultipleAutoIncrement(String),
    /// Auto-increment requires an INTEGER column.
    #[error("auto-increment column {0} must be INTEGER")]
    AutoIncrementNotInteger(String),
    /// A foreign key lists no column references.
    #[error("foreign key to {0} has no references")]
    EmptyForeignKey(String),
    /// A foreign key's local column is not declared on the table.
    #[error("foreign key column {0} is not a column of the table")]
    UnknownForeignKeyColumn(String),
    /// An index group lists no columns.
    #[error("index {0} has no columns")]
    EmptyIndex(String),
    /// An index group names a column the table does not have.
    #[error("index {index} references unknown column {column}")]
    UnknownIndexColumn { index: String, column: String },
    /// Caching is enabled with a capacity of zero.
    #[error("cache for table {0} is enabled with size 0")]
    ZeroCacheSize(String),
    /// An LRU or sparse cache on a table whose key is not one INTEGER column.
    #[error("{kind:?} cache for table {table} needs a single INTEGER primary key")]
    CacheNeedsIntegerKey { table: String, kind: CacheKind },
    /// A column names a converter that is not registered.
    #[error("column {column} uses unknown converter {converter}")]
    UnknownConverter { column: String, converter: String },
    /// A column's converter stores a different SQL type than the column.
    #[error("column {column} is {column_type} but converter {converter} stores {converter_type}")]
    ConverterTypeMismatch {
        column: String,
        converter: String,
        column_type: SqlType,
        converter_type: SqlType,
    },
}

fn identifier_regex() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"))
}

/// Whether `name` can be used unquoted as a table, column or index name.
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_regex().is_match(name)
}

/// Validates a table definition, returning every problem found.
///
/// Checks names, duplicate columns, primary-key shape, foreign keys,
/// index groups and the cache configuration. Converter names are checked
/// by [`Registry::register_table`](crate::Registry::register_table), which
/// knows the registered converters.
pub fn validate_table(table: &Table) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if table.name.trim().is_empty() {
        errors.push(ValidationError::EmptyTableName);
        return errors;
    }
    if !is_valid_identifier(&table.name) {
        errors.push(ValidationError::InvalidIdentifier(table.name.clone()));
    }
    if table.columns.is_empty() {
        errors.push(ValidationError::NoColumns(table.name.clone()));
        return errors;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for column in &table.columns {
        if !is_valid_identifier(&column.name) {
            errors.push(ValidationError::InvalidIdentifier(column.name.clone()));
        }
        if !seen.insert(column.name.as_str()) {
            errors.push(ValidationError::DuplicateColumn(column.name.clone()));
        }
    }

    errors.extend(validate_primary_key(table));

    for fk in &table.foreign_keys {
        if !is_valid_identifier(&fk.table) {
            errors.push(ValidationError::InvalidIdentifier(fk.table.clone()));
        }
        if fk.references.is_empty() {
            errors.push(ValidationError::EmptyForeignKey(fk.table.clone()));
        }
        for reference in &fk.references {
            if !seen.contains(reference.column.as_str()) {
                errors.push(ValidationError::UnknownForeignKeyColumn(
                    reference.column.clone(),
                ));
            }
        }
    }

    for index in &table.indexes {
        if !is_valid_identifier(&index.name) {
            errors.push(ValidationError::InvalidIdentifier(index.name.clone()));
        }
        if index.columns.is_empty() {
            errors.push(ValidationError::EmptyIndex(index.name.clone()));
        }
        for column in &index.columns {
            if !seen.contains(column.as_str()) {
                errors.push(ValidationError::UnknownIndexColumn {
                    index: index.name.clone(),
                    column: column.clone(),
                });
            }
        }
    }

    if let Some(cache) = table.cache.filter(|c| c.enabled) {
        if cache.size == 0 {
            errors.push(ValidationError::ZeroCacheSize(table.name.clone()));
        }
        if cache.kind != CacheKind::Map && !table.has_integer_key() {
            errors.push(ValidationError::CacheNeedsIntegerKey {
                table: table.name.clone(),
                kind: cache.kind,
            });
        }
    }

    errors
}

fn validate_primary_key(table: &Table) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let auto: Vec<_> = table.columns.iter().filter(|c| c.auto_increment).collect();
    let keys = table.columns.iter().filter(|c| c.is_key()).count();

    if keys == 0 {
        errors.push(ValidationError::MissingPrimaryKey(table.name.clone()));
    }
    if auto.len() > 1 {
        errors.push(ValidationError::MultipleAutoIncrement(table.name.clone()));
    } else if auto.len() == 1 && keys > 1 {
        errors.push(ValidationError::AutoIncrementWithCompositeKey(
            table.name.clone(),
        ));
    }
    for column in auto {
        if column.sql_type != SqlType::Integer {
            errors.push(ValidationError::AutoIncrementNotInteger(column.name.clone()));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{CacheConfig, Column, ForeignKey};

    fn base() -> Table {
        Table::new("T").column(Column::new("id", SqlType::Integer).auto_increment())
    }

    #[test]
    fn test_valid_table() {
        assert!(validate_table(&base()).is_empty());
    }

    #[test]
    fn test_empty_name_short_circuits() {
        assert_eq!(
            validate_table(&Table::new("  ")),
            vec![ValidationError::EmptyTableName]
        );
    }

    #[test]
    fn test_no_columns() {
        assert_eq!(
            validate_table(&Table::new("T")),
            vec![ValidationError::NoColumns("T".into())]
        );
    }

    #[test]
    fn test_invalid_identifiers() {
        let table = Table::new("bad name").column(Column::new("1st", SqlType::Integer).primary_key());
        let errors = validate_table(&table);
        assert!(errors.contains(&ValidationError::InvalidIdentifier("bad name".into())));
        assert!(errors.contains(&ValidationError::InvalidIdentifier("1st".into())));
    }

    #[test]
    fn test_duplicate_column() {
        let table = base().column(Column::new("id", SqlType::Integer));
        assert!(validate_table(&table).contains(&ValidationError::DuplicateColumn("id".into())));
    }

    #[test]
    fn test_auto_increment_mixed_with_key() {
        let table = base().column(Column::new("code", SqlType::Text).primary_key());
        assert_eq!(
            validate_table(&table),
            vec![ValidationError::AutoIncrementWithCompositeKey("T".into())]
        );
    }

    #[test]
    fn test_multiple_auto_increment() {
        let table = base().column(Column::new("other", SqlType::Integer).auto_increment());
        assert_eq!(
            validate_table(&table),
            vec![ValidationError::MultipleAutoIncrement("T".into())]
        );
    }

    #[test]
    fn test_auto_increment_must_be_integer() {
        let table = Table::new("T").column(Column::new("id", SqlType::Text).auto_increment());
        assert_eq!(
            validate_table(&table),
            vec![ValidationError::AutoIncrementNotInteger("id".into())]
        );
    }

    #[test]
    fn test_foreign_key_problems() {
        let table = base()
            .foreign_key(ForeignKey::new("Dept"))
            .foreign_key(ForeignKey::new("Dept").reference("dept_id", "id"));
        let errors = validate_table(&table);
        assert!(errors.contains(&ValidationError::EmptyForeignKey("Dept".into())));
        assert!(errors.contains(&ValidationError::UnknownForeignKeyColumn("dept_id".into())));
    }

    #[test]
    fn test_index_problems() {
        let table = base()
            .index("empty", Vec::<String>::new(), false)
            .index("by_x", ["x"], false);
        let errors = validate_table(&table);
        assert!(errors.contains(&ValidationError::EmptyIndex("empty".into())));
        assert!(errors.contains(&ValidationError::UnknownIndexColumn {
            index: "by_x".into(),
            column: "x".into()
        }));
    }

    #[test]
    fn test_zero_cache_size() {
        let table = base().cache(CacheConfig::enabled(CacheKind::Lru, 0));
        assert_eq!(
            validate_table(&table),
            vec![ValidationError::ZeroCacheSize("T".into())]
        );
    }

    #[test]
    fn test_ordered_caches_need_integer_key() {
        let text_key = Table::new("Tag")
            .column(Column::new("name", SqlType::Text).primary_key())
            .cache(CacheConfig::enabled(CacheKind::Lru, 10));
        assert_eq!(
            validate_table(&text_key),
            vec![ValidationError::CacheNeedsIntegerKey {
                table: "Tag".into(),
                kind: CacheKind::Lru,
            }]
        );

        let composite = Table::new("Badge")
            .column(Column::new("dept", SqlType::Integer).primary_key())
            .column(Column::new("code", SqlType::Integer).primary_key())
            .cache(CacheConfig::enabled(CacheKind::Sparse, 10));
        assert!(!composite.has_integer_key());
        assert_eq!(validate_table(&composite).len(), 1);

        let map = text_key.clone().cache(CacheConfig::enabled(CacheKind::Map, 10));
        assert!(validate_table(&map).is_empty());

        let integer = Table::new("Seat")
            .column(Column::new("number", SqlType::Integer).primary_key())
            .cache(CacheConfig::enabled(CacheKind::Sparse, 10));
        assert!(validate_table(&integer).is_empty());
    }
}
