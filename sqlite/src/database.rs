//! The database handle: one connection plus the registry it was opened with.
//!
//! [`Database::builder`] opens a file or in-memory database, applies the
//! configured pragmas, creates every registered table on a fresh database,
//! and runs migrations up to the configured version.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sqlweave_core::statement::Select;
//! use sqlweave_core::{Column, Registry, SqlType, Table, column};
//! use sqlweave_db::DatabaseConfig;
//! use sqlweave_sqlite::Database;
//!
//! let registry = Registry::default()
//!     .with_table(
//!         Table::new("Employee")
//!             .column(Column::new("id", SqlType::Integer).auto_increment())
//!             .column(Column::new("salary", SqlType::Integer)),
//!     )
//!     .unwrap();
//!
//! let db = Database::builder(Arc::new(registry))
//!     .config(DatabaseConfig::new("company", 1))
//!     .open("company.db")
//!     .unwrap();
//!
//! let rows = db
//!     .query(&Select::all().from("Employee").where_(column("salary").greater_than(20000)), &[])
//!     .unwrap();
//! println!("{} well paid", rows.len());
//! ```

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use sqlweave_core::{
    ConverterRegistry, Query, Registry, SchemaObject, SqlError, SqlValue, Table, quote,
};
use sqlweave_db::DatabaseConfig;

use crate::convert::{Param, from_value_ref};
use crate::error::{Result, SqliteError};
use crate::migration::Migrations;

/// One result row with its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Value of the named column, matched case-insensitively.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .map(|i| &self.values[i])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

pub(crate) fn user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

pub(crate) fn set_user_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version}"))?;
    Ok(())
}

/// Column names of `table`, in declaration order.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}

fn create_table(conn: &Connection, table: &Table, converters: &ConverterRegistry) -> Result<()> {
    conn.execute_batch(&table.create_query_with(converters)?)?;
    for index in table.index_statements() {
        conn.execute_batch(&index.create_query_with(converters)?)?;
    }
    Ok(())
}

/// Builder for opening a [`Database`].
pub struct DatabaseBuilder {
    registry: Arc<Registry>,
    config: DatabaseConfig,
    migrations: Migrations,
}

impl DatabaseBuilder {
    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn migrations(mut self, migrations: Migrations) -> Self {
        self.migrations = migrations;
        self
    }

    /// Opens (or creates) a database file.
    pub fn open(self, path: impl AsRef<Path>) -> Result<Database> {
        let conn = Connection::open(path)?;
        self.finish(conn)
    }

    pub fn open_in_memory(self) -> Result<Database> {
        let conn = Connection::open_in_memory()?;
        self.finish(conn)
    }

    fn finish(mut self, mut conn: Connection) -> Result<Database> {
        self.config.validate()?;

        let foreign_keys = if self.config.foreign_keys { "ON" } else { "OFF" };
        conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
        if let Some(mode) = self.config.journal_mode {
            let applied: String = conn.query_row(
                &format!("PRAGMA journal_mode = {}", mode.as_sql()),
                [],
                |row| row.get(0),
            )?;
            tracing::debug!(requested = mode.as_sql(), %applied, "journal mode set");
        }

        let current = user_version(&conn)?;
        let target = self.config.version;
        if current > target {
            return Err(SqliteError::MigrationState(format!(
                "database '{}' is at version {current}, newer than {target}",
                self.config.name
            )));
        }

        if current == 0 {
            let tables = self.registry.creation_order()?;
            tracing::info!(database = %self.config.name, tables = tables.len(), "creating tables");
            let tx = conn.transaction()?;
            for table in tables {
                create_table(&tx, table, self.registry.converters())?;
            }
            tx.commit()?;
        }

        if current < target {
            tracing::info!(database = %self.config.name, from = current, to = target, "upgrading");
            self.migrations
                .run(&mut conn, &self.registry, current, target)?;
            set_user_version(&conn, target)?;
        }

        Ok(Database {
            conn,
            registry: self.registry,
            config: self.config,
            savepoint_depth: 0,
        })
    }
}

/// An open database.
///
/// All statements go through this handle. It is not shared between threads
/// directly; the transaction queue owns it behind a mutex.
pub struct Database {
    conn: Connection,
    registry: Arc<Registry>,
    config: DatabaseConfig,
    savepoint_depth: u32,
}

impl Database {
    pub fn builder(registry: Arc<Registry>) -> DatabaseBuilder {
        DatabaseBuilder {
            registry,
            config: DatabaseConfig::default(),
            migrations: Migrations::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The stored schema version.
    pub fn version(&self) -> Result<u32> {
        user_version(&self.conn)
    }

    fn render<Q: Query + ?Sized>(&self, query: &Q, args: &[SqlValue]) -> Result<String> {
        let expected = query.param_count();
        if args.is_empty() && expected > 0 {
            return Err(SqlError::UnresolvedPlaceholder(expected).into());
        }
        if args.len() != expected {
            return Err(SqlError::PlaceholderCount {
                expected,
                actual: args.len(),
            }
            .into());
        }
        let sql = query.query_with(self.registry.converters())?;
        tracing::trace!(%sql, "executing");
        Ok(sql)
    }

    /// Executes a statement without placeholders. Returns changed rows.
    pub fn execute<Q: Query + ?Sized>(&self, query: &Q) -> Result<usize> {
        self.execute_with(query, &[])
    }

    /// Executes a statement, binding one value per `?` placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::UnresolvedPlaceholder`] if the statement has
    /// placeholders and no values were given, or
    /// [`SqlError::PlaceholderCount`] if the counts differ.
    pub fn execute_with<Q: Query + ?Sized>(&self, query: &Q, args: &[SqlValue]) -> Result<usize> {
        let sql = self.render(query, args)?;
        let params: Vec<Param<'_>> = args.iter().map(Param).collect();
        Ok(self
            .conn
            .execute(&sql, rusqlite::params_from_iter(params.iter()))?)
    }

    /// Runs a query and collects every row.
    pub fn query<Q: Query + ?Sized>(&self, query: &Q, args: &[SqlValue]) -> Result<Vec<Row>> {
        let sql = self.render(query, args)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = columns.len();

        let params: Vec<Param<'_>> = args.iter().map(Param).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            out.push(Row {
                columns: Arc::clone(&columns),
                values,
            });
        }
        Ok(out)
    }

    /// First column of the first row as an integer, `0` when there is none.
    pub fn count<Q: Query + ?Sized>(&self, query: &Q, args: &[SqlValue]) -> Result<i64> {
        let rows = self.query(query, args)?;
        Ok(rows
            .first()
            .and_then(|row| row.values().first())
            .and_then(SqlValue::as_integer)
            .unwrap_or(0))
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Creates a schema object such as an index or trigger.
    pub fn enable(&self, object: &dyn SchemaObject) -> Result<()> {
        self.conn
            .execute_batch(&object.create_query_with(self.registry.converters())?)?;
        tracing::debug!(name = object.name(), "enabled");
        Ok(())
    }

    /// Drops a schema object.
    pub fn disable(&self, object: &dyn SchemaObject) -> Result<()> {
        self.conn.execute_batch(&object.drop_query())?;
        tracing::debug!(name = object.name(), "disabled");
        Ok(())
    }

    /// Creates a table and its declared indexes.
    pub fn create_table(&self, table: &Table) -> Result<()> {
        create_table(&self.conn, table, self.registry.converters())
    }

    /// Runs `work` inside a savepoint. Nested calls nest savepoints; an
    /// error rolls back only the innermost one.
    pub fn transaction<R>(&mut self, work: impl FnOnce(&mut Database) -> Result<R>) -> Result<R> {
        let name = format!("sqlweave_{}", self.savepoint_depth);
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        self.savepoint_depth += 1;
        let outcome = work(self);
        self.savepoint_depth -= 1;

        match outcome {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {name}"))?;
                Ok(value)
            }
            Err(err) => {
                self.conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
                Err(err)
            }
        }
    }

    pub(crate) fn savepoint_depth(&self) -> u32 {
        self.savepoint_depth
    }

    /// Rolls back every savepoint opened above `depth`, e.g. after a unit of
    /// work panicked inside [`transaction`](Self::transaction).
    pub(crate) fn unwind_to(&mut self, depth: u32) -> Result<()> {
        while self.savepoint_depth > depth {
            self.savepoint_depth -= 1;
            let name = format!("sqlweave_{}", self.savepoint_depth);
            self.conn
                .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
        }
        Ok(())
    }
}
