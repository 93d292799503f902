use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use sqlweave_core::{ConverterRegistry, Query, Registry, SchemaObject};
use sqlweave_db::{DatabaseConfig, SchemaSet};
use sqlweave_sqlite::{Database, Migrations};

#[derive(Debug, Parser)]
#[command(name = "sqlweave")]
#[command(about = "SQLite schema DDL, bundling and migrations", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print CREATE statements for a schema in foreign-key order.
    Ddl(DdlArgs),
    /// Bundle a directory of table files into one JSON file.
    Bundle(BundleArgs),
    /// Create or upgrade a database to the configured version.
    Migrate(MigrateArgs),
    /// Show a database's schema version and table row counts.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
struct DdlArgs {
    /// Schema directory or JSON bundle.
    #[arg(long)]
    schema: PathBuf,
}

#[derive(Debug, Args)]
struct BundleArgs {
    /// Schema directory.
    #[arg(long)]
    schema: PathBuf,
    /// Output JSON bundle path.
    #[arg(long)]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Schema directory or JSON bundle.
    #[arg(long)]
    schema: PathBuf,
    /// Database config YAML (version, pragmas, migrations directory).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory of `<version>.sql` files; overrides the config's.
    #[arg(long)]
    migrations: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ddl(args) => run_ddl(args),
        Command::Bundle(args) => run_bundle(args),
        Command::Migrate(args) => run_migrate(args),
        Command::Status(args) => run_status(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run_ddl(args: DdlArgs) -> Result<(), String> {
    let registry = load_registry(&args.schema)?;
    let tables = registry
        .creation_order()
        .map_err(|e| format!("Invalid schema: {e}"))?;
    for table in tables {
        let create = table
            .create_query()
            .map_err(|e| format!("Failed to build table '{}': {e}", table.name))?;
        println!("{create};");
        for index in table.index_statements() {
            let sql = index
                .query()
                .map_err(|e| format!("Failed to build index '{}': {e}", index.name()))?;
            println!("{sql};");
        }
    }
    Ok(())
}

fn run_bundle(args: BundleArgs) -> Result<(), String> {
    let set = SchemaSet::from_dir(&args.schema)
        .map_err(|e| format!("Failed to load '{}': {e}", args.schema.display()))?;
    if set.is_empty() {
        return Err(format!("No table files found in '{}'", args.schema.display()));
    }
    set.save_bundle(&args.output)
        .map_err(|e| format!("Failed to write '{}': {e}", args.output.display()))?;
    println!(
        "Bundled {} table(s) into '{}'.",
        set.len(),
        args.output.display()
    );
    Ok(())
}

fn run_migrate(args: MigrateArgs) -> Result<(), String> {
    let registry = load_registry(&args.schema)?;
    let config = match &args.config {
        Some(path) => DatabaseConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        None => DatabaseConfig::default(),
    };

    let migrations_dir = args.migrations.clone().or_else(|| {
        args.config
            .as_deref()
            .and_then(|path| config.migrations_dir_from(path))
    });
    let mut migrations = Migrations::new();
    if let Some(dir) = &migrations_dir {
        let found = migrations
            .load_sql_dir(dir)
            .map_err(|e| format!("Failed to read migrations '{}': {e}", dir.display()))?;
        println!("Loaded {found} migration file(s) from '{}'.", dir.display());
    }

    let db = Database::builder(Arc::new(registry))
        .config(config)
        .migrations(migrations)
        .open(&args.db)
        .map_err(|e| format!("Migration failed: {e}"))?;
    let version = db
        .version()
        .map_err(|e| format!("Failed to read version: {e}"))?;
    println!(
        "Database '{}' is at version {version}.",
        args.db.display()
    );
    Ok(())
}

fn run_status(args: StatusArgs) -> Result<(), String> {
    if !args.db.exists() {
        return Err(format!("Database '{}' does not exist", args.db.display()));
    }
    let conn = rusqlite::Connection::open(&args.db)
        .map_err(|e| format!("Failed to open database '{}': {e}", args.db.display()))?;
    let (version, tables) =
        read_status(&conn).map_err(|e| format!("Failed to read status: {e}"))?;

    if args.json {
        let tables: Vec<_> = tables
            .iter()
            .map(|(name, rows)| serde_json::json!({ "name": name, "rows": rows }))
            .collect();
        let report = serde_json::json!({ "version": version, "tables": tables });
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("JSON serialization failed: {e}"))?;
        println!("{text}");
        return Ok(());
    }

    println!("Database Status:");
    println!("  Version: {version}");
    println!("  Tables: {}", tables.len());
    for (name, rows) in &tables {
        println!("    {name}: {rows} row(s)");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Loads a schema from a directory of table files or from a JSON bundle.
fn load_registry(path: &Path) -> Result<Registry, String> {
    let set = if path.is_dir() {
        SchemaSet::from_dir(path)
    } else {
        SchemaSet::from_bundle(path)
    }
    .map_err(|e| format!("Failed to load schema '{}': {e}", path.display()))?;
    set.into_registry(ConverterRegistry::default())
        .map_err(|e| format!("Invalid schema: {e}"))
}

fn read_status(conn: &rusqlite::Connection) -> rusqlite::Result<(u32, Vec<(String, i64)>)> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let sql = format!("SELECT COUNT(*) FROM {}", sqlweave_core::quote(&name));
        let rows: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        tables.push((name, rows));
    }
    Ok((version, tables))
}
