//! Versioned schema migrations.
//!
//! A [`Migration`] moves through three phases: `on_pre_migrate` prepares its
//! SQL text, `migrate` executes it against a live connection, and
//! `on_post_migrate` releases whatever the first two held. The phases are
//! enforced by [`MigrationLifecycle`].
//!
//! [`Migrations`] collects migrations by schema version and applies every
//! version in `(current, target]` in ascending order, each version inside a
//! single transaction.
//!
//! # Example
//!
//! ```no_run
//! use sqlweave_core::{Registry, SqlType};
//! use sqlweave_sqlite::{AlterTableMigration, IndexMigration, Migrations};
//!
//! let mut migrations = Migrations::new();
//! migrations.add(
//!     2,
//!     0,
//!     AlterTableMigration::new("Employee")
//!         .add_column(SqlType::Text, "email")
//!         .add_column(SqlType::Integer, "level"),
//! );
//! migrations.add(2, 10, IndexMigration::new("email_index", "Employee").add_column("email"));
//!
//! let mut conn = rusqlite::Connection::open("company.db").unwrap();
//! migrations.run(&mut conn, &Registry::default(), 1, 2).unwrap();
//! ```

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::Connection;
use sqlweave_core::statement::{Index, Update};
use sqlweave_core::{
    Condition, ConditionGroup, Query, Registry, SchemaObject, SqlType, quote,
};
use sqlweave_db::DatabaseError;

use crate::database::{set_user_version, table_columns};
use crate::error::{Result, SqliteError};

/// One versioned schema or data change.
pub trait Migration: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Prepares query text. Converters come from `registry`.
    fn on_pre_migrate(&mut self, registry: &Registry) -> Result<()> {
        let _ = registry;
        Ok(())
    }

    /// Executes against a connection that is inside the version's
    /// transaction.
    fn migrate(&mut self, conn: &Connection) -> Result<()>;

    /// Releases prepared state. Called after `migrate` whether it succeeded
    /// or not.
    fn on_post_migrate(&mut self) {}
}

/// Phases of a single migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    Created,
    PreMigrated,
    Migrated,
    PostMigrated,
}

/// Drives one migration through its phases in order.
///
/// # Examples
///
/// ```
/// use sqlweave_core::Registry;
/// use sqlweave_sqlite::{MigrationLifecycle, MigrationPhase, SqlMigration};
///
/// let conn = rusqlite::Connection::open_in_memory().unwrap();
/// let mut lifecycle = MigrationLifecycle::new(Box::new(
///     SqlMigration::new("create").statement("CREATE TABLE t(x INTEGER)"),
/// ));
/// assert!(lifecycle.migrate(&conn).is_err());
///
/// lifecycle.pre_migrate(&Registry::default()).unwrap();
/// lifecycle.migrate(&conn).unwrap();
/// lifecycle.post_migrate().unwrap();
/// assert_eq!(lifecycle.phase(), MigrationPhase::PostMigrated);
/// ```
pub struct MigrationLifecycle {
    migration: Box<dyn Migration>,
    phase: MigrationPhase,
}

impl MigrationLifecycle {
    pub fn new(migration: Box<dyn Migration>) -> Self {
        Self {
            migration,
            phase: MigrationPhase::Created,
        }
    }

    pub fn name(&self) -> &str {
        self.migration.name()
    }

    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    fn out_of_order(&self, step: &str) -> SqliteError {
        SqliteError::MigrationState(format!(
            "cannot run {step} on '{}' in phase {:?}",
            self.name(),
            self.phase
        ))
    }

    pub fn pre_migrate(&mut self, registry: &Registry) -> Result<()> {
        if self.phase != MigrationPhase::Created {
            return Err(self.out_of_order("on_pre_migrate"));
        }
        self.migration.on_pre_migrate(registry)?;
        self.phase = MigrationPhase::PreMigrated;
        Ok(())
    }

    pub fn migrate(&mut self, conn: &Connection) -> Result<()> {
        if self.phase != MigrationPhase::PreMigrated {
            return Err(self.out_of_order("migrate"));
        }
        self.migration.migrate(conn)?;
        self.phase = MigrationPhase::Migrated;
        Ok(())
    }

    /// Allowed once, after `pre_migrate`, whether or not `migrate` succeeded.
    pub fn post_migrate(&mut self) -> Result<()> {
        match self.phase {
            MigrationPhase::PreMigrated | MigrationPhase::Migrated => {
                self.migration.on_post_migrate();
                self.phase = MigrationPhase::PostMigrated;
                Ok(())
            }
            _ => Err(self.out_of_order("on_post_migrate")),
        }
    }

    /// Returns to `Created` so a rolled-back migration can run again.
    fn rewind(&mut self) {
        self.phase = MigrationPhase::Created;
    }
}

/// Renames a table and/or adds columns to it.
///
/// SQLite adds one column per `ALTER TABLE`, so each added column is its own
/// statement, issued in declaration order. Columns that already exist are
/// skipped, which lets the same migration run against a freshly created
/// table.
#[derive(Debug, Clone)]
pub struct AlterTableMigration {
    table: String,
    rename_from: Option<String>,
    columns: Vec<(SqlType, String)>,
}

impl AlterTableMigration {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rename_from: None,
            columns: Vec::new(),
        }
    }

    /// Renames `old_name` to this migration's table before adding columns.
    pub fn rename_from(mut self, old_name: impl Into<String>) -> Self {
        self.rename_from = Some(old_name.into());
        self
    }

    pub fn add_column(mut self, sql_type: SqlType, name: impl Into<String>) -> Self {
        self.columns.push((sql_type, name.into()));
        self
    }

    fn rename_query(&self) -> Option<String> {
        self.rename_from
            .as_ref()
            .map(|old| format!("ALTER TABLE {} RENAME TO {}", quote(old), quote(&self.table)))
    }

    fn add_column_query(&self, sql_type: SqlType, name: &str) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote(&self.table),
            quote(name),
            sql_type.as_sql()
        )
    }

    /// Every statement this migration may run, in order.
    pub fn query_list(&self) -> Vec<String> {
        self.rename_query()
            .into_iter()
            .chain(
                self.columns
                    .iter()
                    .map(|(sql_type, name)| self.add_column_query(*sql_type, name)),
            )
            .collect()
    }
}

impl Migration for AlterTableMigration {
    fn name(&self) -> &str {
        &self.table
    }

    fn migrate(&mut self, conn: &Connection) -> Result<()> {
        if let Some(sql) = self.rename_query() {
            conn.execute_batch(&sql)?;
        }
        let existing = table_columns(conn, &self.table)?;
        for (sql_type, name) in &self.columns {
            if existing.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                tracing::debug!(table = %self.table, column = %name, "column exists, skipping");
                continue;
            }
            conn.execute_batch(&self.add_column_query(*sql_type, name))?;
        }
        Ok(())
    }
}

/// Creates an index over distinct columns.
#[derive(Debug, Clone)]
pub struct IndexMigration {
    index: Index,
    prepared: Option<String>,
}

impl IndexMigration {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            index: Index::new(name).on(table, std::iter::empty::<String>()),
            prepared: None,
        }
    }

    /// Adds a column; a name already present is ignored.
    pub fn add_column(mut self, column: impl Into<String>) -> Self {
        self.index.add_column(column);
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.index = self.index.unique(unique);
        self
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn create_query(&self) -> Result<String> {
        Ok(self.index.create_query()?)
    }

    pub fn drop_query(&self) -> String {
        self.index.drop_query()
    }
}

impl Migration for IndexMigration {
    fn name(&self) -> &str {
        self.index.name()
    }

    fn on_pre_migrate(&mut self, registry: &Registry) -> Result<()> {
        self.prepared = Some(self.index.create_query_with(registry.converters())?);
        Ok(())
    }

    fn migrate(&mut self, conn: &Connection) -> Result<()> {
        let sql = self
            .prepared
            .as_deref()
            .ok_or_else(|| SqliteError::MigrationState("index query not prepared".into()))?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn on_post_migrate(&mut self) {
        self.prepared = None;
    }
}

/// Runs one `UPDATE table SET ... WHERE ...` built from two groups.
#[derive(Debug, Clone)]
pub struct UpdateTableMigration {
    table: String,
    set: ConditionGroup,
    where_: ConditionGroup,
    prepared: Option<String>,
}

impl UpdateTableMigration {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set: ConditionGroup::comma(),
            where_: ConditionGroup::new(),
            prepared: None,
        }
    }

    pub fn set(mut self, assignment: Condition) -> Result<Self> {
        self.set = self.set.push(assignment)?;
        Ok(self)
    }

    pub fn where_(mut self, condition: Condition) -> Result<Self> {
        self.where_ = self.where_.and(condition)?;
        Ok(self)
    }

    /// The statement as it will be executed.
    pub fn query(&self, registry: &Registry) -> Result<String> {
        let update = Update::table(&self.table)
            .set_group(self.set.clone())?
            .where_(self.where_.clone());
        Ok(update.query_with(registry.converters())?)
    }
}

impl Migration for UpdateTableMigration {
    fn name(&self) -> &str {
        &self.table
    }

    fn on_pre_migrate(&mut self, registry: &Registry) -> Result<()> {
        self.prepared = Some(self.query(registry)?);
        Ok(())
    }

    fn migrate(&mut self, conn: &Connection) -> Result<()> {
        let sql = self
            .prepared
            .as_deref()
            .ok_or_else(|| SqliteError::MigrationState("update query not prepared".into()))?;
        let changed = conn.execute(sql, [])?;
        tracing::debug!(table = %self.table, changed, "update migration applied");
        Ok(())
    }

    fn on_post_migrate(&mut self) {
        self.prepared = None;
    }
}

/// Raw SQL, executed batch by batch.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    name: String,
    batches: Vec<String>,
}

impl SqlMigration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batches: Vec::new(),
        }
    }

    /// Adds SQL text; it may hold several `;`-separated statements.
    pub fn statement(mut self, sql: impl Into<String>) -> Self {
        self.batches.push(sql.into());
        self
    }

    /// Reads a whole `.sql` file as one batch.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let sql = std::fs::read_to_string(path).map_err(DatabaseError::from)?;
        Ok(Self::new(path.display().to_string()).statement(sql))
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn migrate(&mut self, conn: &Connection) -> Result<()> {
        for sql in &self.batches {
            conn.execute_batch(sql)?;
        }
        Ok(())
    }
}

struct Entry {
    priority: i32,
    lifecycle: MigrationLifecycle,
}

/// Migrations grouped by schema version.
#[derive(Default)]
pub struct Migrations {
    by_version: BTreeMap<u32, Vec<Entry>>,
}

impl Migrations {
    /// Priority given to `<version>.sql` files so they run before other
    /// migrations of the same version.
    pub const SQL_FILE_PRIORITY: i32 = i32::MAX;

    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a migration. Within a version, higher priority runs first;
    /// equal priorities run in the order they were added.
    pub fn add(&mut self, version: u32, priority: i32, migration: impl Migration + 'static) -> &mut Self {
        self.by_version.entry(version).or_default().push(Entry {
            priority,
            lifecycle: MigrationLifecycle::new(Box::new(migration)),
        });
        self
    }

    /// Adds every `<version>.sql` file in `dir`. Returns how many were found.
    pub fn load_sql_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(DatabaseError::from)? {
            let path = entry.map_err(DatabaseError::from)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            let Some(version) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            else {
                tracing::warn!(path = %path.display(), "ignoring sql file without a version name");
                continue;
            };
            found.push((version, path));
        }
        found.sort();

        let count = found.len();
        for (version, path) in found {
            self.add(version, Self::SQL_FILE_PRIORITY, SqlMigration::from_file(&path)?);
        }
        Ok(count)
    }

    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_version.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_version.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_version.is_empty()
    }

    /// Applies every version in `(current, target]`, ascending.
    ///
    /// Each version runs in one transaction and records `user_version` on
    /// commit. The first failing migration rolls its version back and stops
    /// the run; `on_post_migrate` is still called for it. Migrations are
    /// removed from the collection once their version commits, so a failed
    /// version stays registered and a later call retries it.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::MigrationFailed`] naming the failing migration.
    pub fn run(
        &mut self,
        conn: &mut Connection,
        registry: &Registry,
        current: u32,
        target: u32,
    ) -> Result<()> {
        if current >= target {
            return Ok(());
        }
        let versions: Vec<u32> = self
            .by_version
            .range(current + 1..=target)
            .map(|(v, _)| *v)
            .collect();

        for version in versions {
            let Some(entries) = self.by_version.get_mut(&version) else {
                continue;
            };
            entries.sort_by_key(|e| Reverse(e.priority));
            tracing::info!(version, count = entries.len(), "running migrations");

            let tx = conn.transaction()?;
            for entry in entries.iter_mut() {
                let lifecycle = &mut entry.lifecycle;
                lifecycle.rewind();
                let outcome = lifecycle
                    .pre_migrate(registry)
                    .and_then(|()| lifecycle.migrate(&tx));
                let released = lifecycle.post_migrate();

                if let Err(err) = outcome {
                    tracing::error!(version, migration = lifecycle.name(), error = %err, "migration failed");
                    return Err(SqliteError::MigrationFailed {
                        version,
                        name: lifecycle.name().to_string(),
                        source: Box::new(err),
                    });
                }
                released?;
            }
            set_user_version(&tx, version)?;
            tx.commit()?;
            self.by_version.remove(&version);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlweave_core::column;
    use std::sync::{Arc, Mutex};

    fn conn_with_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE `T`(`id` INTEGER PRIMARY KEY, `name` TEXT)")
            .unwrap();
        conn
    }

    #[test]
    fn test_alter_add_columns_one_statement_each() {
        let migration = AlterTableMigration::new("T")
            .add_column(SqlType::Text, "a")
            .add_column(SqlType::Integer, "b")
            .add_column(SqlType::Real, "c");
        let queries = migration.query_list();
        assert_eq!(
            queries,
            [
                "ALTER TABLE `T` ADD COLUMN `a` TEXT",
                "ALTER TABLE `T` ADD COLUMN `b` INTEGER",
                "ALTER TABLE `T` ADD COLUMN `c` REAL",
            ]
        );
    }

    #[test]
    fn test_alter_rename_then_add() {
        let conn = conn_with_table();
        let mut lifecycle = MigrationLifecycle::new(Box::new(
            AlterTableMigration::new("T2")
                .rename_from("T")
                .add_column(SqlType::Text, "email")
                .add_column(SqlType::Text, "name"),
        ));
        lifecycle.pre_migrate(&Registry::default()).unwrap();
        lifecycle.migrate(&conn).unwrap();
        lifecycle.post_migrate().unwrap();
        assert_eq!(table_columns(&conn, "T2").unwrap(), ["id", "name", "email"]);
    }

    #[test]
    fn test_index_migration_ignores_duplicate_columns() {
        let migration = IndexMigration::new("name_index", "T")
            .add_column("name")
            .add_column("name");
        assert_eq!(migration.index().columns(), ["name"]);
        assert_eq!(
            migration.create_query().unwrap(),
            "CREATE INDEX IF NOT EXISTS `name_index` ON `T`(`name`)"
        );
        assert_eq!(migration.drop_query(), "DROP INDEX IF EXISTS `name_index`");
    }

    #[test]
    fn test_update_migration_query() {
        let migration = UpdateTableMigration::new("T")
            .set(column("name").is("none"))
            .unwrap()
            .where_(column("name").is_null())
            .unwrap();
        assert_eq!(
            migration.query(&Registry::default()).unwrap(),
            "UPDATE `T` SET `name`='none' WHERE `name` IS NULL"
        );
    }

    #[test]
    fn test_lifecycle_out_of_order() {
        let conn = conn_with_table();
        let mut lifecycle =
            MigrationLifecycle::new(Box::new(SqlMigration::new("noop").statement("SELECT 1")));
        assert!(matches!(lifecycle.post_migrate(), Err(SqliteError::MigrationState(_))));
        lifecycle.pre_migrate(&Registry::default()).unwrap();
        assert!(lifecycle.pre_migrate(&Registry::default()).is_err());
        lifecycle.migrate(&conn).unwrap();
        lifecycle.post_migrate().unwrap();
        assert!(lifecycle.post_migrate().is_err());
    }

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Migration for Recorder {
        fn name(&self) -> &str {
            self.label
        }

        fn migrate(&mut self, conn: &Connection) -> Result<()> {
            self.log.lock().unwrap().push(self.label.to_string());
            if self.fail {
                conn.execute_batch("INSERT INTO missing_table VALUES (1)")?;
            }
            Ok(())
        }

        fn on_post_migrate(&mut self) {
            self.log.lock().unwrap().push(format!("post:{}", self.label));
        }
    }

    fn recorder(label: &'static str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Recorder {
        Recorder {
            label,
            log: Arc::clone(log),
            fail,
        }
    }

    #[test]
    fn test_priority_and_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut migrations = Migrations::new();
        migrations
            .add(2, 0, recorder("low-first", &log, false))
            .add(2, 5, recorder("high", &log, false))
            .add(2, 0, recorder("low-second", &log, false))
            .add(1, 0, recorder("v1", &log, false))
            .add(3, 0, recorder("v3", &log, false));

        let mut conn = Connection::open_in_memory().unwrap();
        migrations
            .run(&mut conn, &Registry::default(), 0, 2)
            .unwrap();

        let log = log.lock().unwrap();
        let order: Vec<&str> = log
            .iter()
            .filter(|l| !l.starts_with("post:"))
            .map(String::as_str)
            .collect();
        assert_eq!(order, ["v1", "high", "low-first", "low-second"]);
        assert_eq!(migrations.versions().collect::<Vec<_>>(), [3]);
    }

    #[test]
    fn test_failure_aborts_version_and_later() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut migrations = Migrations::new();
        migrations
            .add(2, 0, SqlMigration::new("create").statement("CREATE TABLE made(x)"))
            .add(2, 0, recorder("bad", &log, true))
            .add(2, 0, recorder("after-bad", &log, false))
            .add(3, 0, recorder("v3", &log, false));

        let mut conn = Connection::open_in_memory().unwrap();
        let err = migrations
            .run(&mut conn, &Registry::default(), 1, 3)
            .unwrap_err();
        assert!(matches!(err, SqliteError::MigrationFailed { version: 2, ref name, .. } if name == "bad"));

        assert_eq!(*log.lock().unwrap(), ["bad", "post:bad"]);
        // Rolled back
        let made: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'made'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(made, 0);
        let version: u32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 0);
        assert_eq!(migrations.versions().collect::<Vec<_>>(), [2, 3]);
    }

    #[test]
    fn test_failed_version_runs_again() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut migrations = Migrations::new();
        migrations
            .add(1, 0, SqlMigration::new("fill").statement("INSERT INTO target VALUES (1)"))
            .add(2, 0, recorder("v2", &log, false));

        let mut conn = Connection::open_in_memory().unwrap();
        let err = migrations
            .run(&mut conn, &Registry::default(), 0, 2)
            .unwrap_err();
        assert!(matches!(err, SqliteError::MigrationFailed { version: 1, ref name, .. } if name == "fill"));
        assert_eq!(migrations.len(), 2);

        conn.execute_batch("CREATE TABLE target(x)").unwrap();
        migrations
            .run(&mut conn, &Registry::default(), 0, 2)
            .unwrap();
        assert!(migrations.is_empty());
        assert_eq!(*log.lock().unwrap(), ["v2", "post:v2"]);
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM target", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        let version: u32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_load_sql_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2.sql"), "-- add data\nCREATE TABLE a(x);\nINSERT INTO a VALUES (1);\n").unwrap();
        std::fs::write(dir.path().join("notes.sql"), "garbage").unwrap();
        std::fs::write(dir.path().join("3.txt"), "ignored").unwrap();

        let mut migrations = Migrations::new();
        assert_eq!(migrations.load_sql_dir(dir.path()).unwrap(), 1);

        let mut conn = Connection::open_in_memory().unwrap();
        migrations
            .run(&mut conn, &Registry::default(), 1, 2)
            .unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM a", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
