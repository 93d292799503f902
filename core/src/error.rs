//! Error types for query construction and table metadata.
//!
//! Everything in this crate fails before any SQL reaches a database: table
//! definitions that contradict themselves, conditions that mix placeholders
//! with real values, joins with two conflicting clauses, or values without a
//! registered converter.

use thiserror::Error;

use crate::validate::ValidationError;

/// Errors raised while describing tables or building statements.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SqlError {
    /// A table definition failed validation and was not registered.
    #[error("invalid table '{table}': {}", join_errors(.errors))]
    InvalidTable {
        table: String,
        errors: Vec<ValidationError>,
    },

    /// A table with the same name is already registered.
    #[error("table already registered: {0}")]
    DuplicateTable(String),

    /// No table with this name is registered.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Tables reference each other through foreign keys in a cycle.
    #[error("foreign key cycle: {0}")]
    ForeignKeyCycle(String),

    /// A typed value has no converter registered for its type.
    #[error("no type converter registered for {0}")]
    MissingConverter(String),

    /// A value could not be converted to or from its stored form.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// A real value was added to a group in empty-parameter mode, or a group
    /// holding real values was switched into that mode.
    #[error("cannot mix real values with empty-parameter placeholders")]
    PlaceholderConflict,

    /// The number of bound values does not match the number of placeholders.
    #[error("expected {expected} placeholder values, got {actual}")]
    PlaceholderCount { expected: usize, actual: usize },

    /// A statement with placeholders was executed without bound values.
    #[error("statement has {0} unresolved placeholder(s)")]
    UnresolvedPlaceholder(usize),

    /// A join was given both an ON and a USING clause.
    #[error("join on {0} cannot have both ON and USING clauses")]
    ConflictingJoinClause(String),

    /// An INSERT row does not have one value per column.
    #[error("insert into {table} lists {columns} column(s) but a row has {values} value(s)")]
    ColumnValueMismatch {
        table: String,
        columns: usize,
        values: usize,
    },

    /// A SET list was given a group with nested groups.
    #[error("SET list for {0} cannot contain nested groups")]
    NestedAssignment(String),

    /// A literal could not be parsed back into a value.
    #[error("invalid SQL literal: {0}")]
    InvalidLiteral(String),

    /// A model field or column lookup failed.
    #[error("unknown column '{column}' on {table}")]
    UnknownColumn { table: String, column: String },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias for results with [`SqlError`].
pub type Result<T> = std::result::Result<T, SqlError>;
