//! Typed SQL construction and table metadata.
//!
//! This crate builds SQL text without touching a database:
//!
//! - [`QueryBuilder`]: the text accumulator every statement writes into.
//! - [`Condition`] / [`ConditionGroup`]: typed `column OP value` fragments
//!   and separator-joined groups of them, including empty-parameter mode.
//! - [`statement`]: `SELECT`, `INSERT`, `UPDATE`, `DELETE`, joins,
//!   triggers and indexes, all implementing [`Query`].
//! - [`Table`]: column, key, foreign key, index and cache metadata, checked
//!   by [`validate_table`] and held in a [`Registry`].
//! - [`ConverterRegistry`]: conversions between Rust values and stored
//!   [`SqlValue`]s, looked up by type at emission time.
//! - [`Model`] / [`FieldMap`]: per-type column accessors.
//!
//! # Example
//!
//! ```
//! use sqlweave_core::statement::{Index, Select};
//! use sqlweave_core::*;
//!
//! let mut registry = Registry::default();
//! registry
//!     .register_table(
//!         Table::new("IndexModel")
//!             .column(Column::new("name", SqlType::Text).primary_key())
//!             .column(Column::new("salary", SqlType::Integer)),
//!     )
//!     .unwrap();
//!
//! let index = Index::new("salary_index").on("IndexModel", ["salary"]);
//! assert_eq!(
//!     index.query().unwrap(),
//!     "CREATE INDEX IF NOT EXISTS `salary_index` ON `IndexModel`(`salary`)"
//! );
//!
//! let select = Select::new(["name"])
//!     .from("IndexModel")
//!     .where_(column("salary").greater_than(20000));
//! assert_eq!(
//!     select.query_with(registry.converters()).unwrap(),
//!     "SELECT `name` FROM `IndexModel` WHERE `salary`>20000"
//! );
//! ```

pub mod builder;
mod condition;
mod converter;
mod error;
mod group;
mod model;
mod query;
mod registry;
pub mod statement;
mod table;
mod validate;
mod value;

pub use builder::{QueryBuilder, quote};
pub use condition::{ColumnRef, Condition, NameAlias, Operand, Operator, column, param};
pub use converter::{
    BooleanConverter, ConverterRegistry, DateConverter, DateTimeConverter, ErasedConverter,
    TypeConverter, TypedValue,
};
pub use error::{Result, SqlError};
pub use group::ConditionGroup;
pub use model::{ColumnValue, Conversion, FieldMap, Model};
pub use query::{Query, SchemaObject, SqlContext};
pub use registry::Registry;
pub use table::{
    CacheConfig, CacheKind, Column, ForeignKey, ForeignKeyAction, ForeignKeyReference,
    IndexGroup, PrimaryKey, Table,
};
pub use validate::{ValidationError, is_valid_identifier, validate_table};
pub use value::{Collate, ConflictAction, SqlType, SqlValue, escape_string};
