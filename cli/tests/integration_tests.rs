use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn sqlweave(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sqlweave"))
        .args(args)
        .output()
        .expect("failed to run sqlweave")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn arg(path: &Path) -> &str {
    path.to_str().expect("temp paths are utf-8")
}

/// Writes an Employee/Department schema, one JSON file per table.
fn write_schema(dir: &TempDir) -> PathBuf {
    let schema = dir.path().join("schema");
    fs::create_dir_all(&schema).unwrap();

    let employee = serde_json::json!({
        "name": "Employee",
        "columns": [
            { "name": "id", "type": "Integer", "primary_key": true, "auto_increment": true },
            { "name": "dept_id", "type": "Integer" },
            { "name": "salary", "type": "Integer" }
        ],
        "foreign_keys": [
            { "table": "Department", "references": [{ "column": "dept_id", "foreign_column": "id" }] }
        ],
        "indexes": [{ "name": "salary_index", "columns": ["salary"] }]
    });
    let department = serde_json::json!({
        "name": "Department",
        "columns": [
            { "name": "id", "type": "Integer", "primary_key": true, "auto_increment": true },
            { "name": "title", "type": "Text" }
        ]
    });
    fs::write(schema.join("Employee.json"), employee.to_string()).unwrap();
    fs::write(schema.join("Department.json"), department.to_string()).unwrap();
    schema
}

#[test]
fn test_ddl_in_foreign_key_order() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir);

    let output = sqlweave(&["ddl", "--schema", arg(&schema)]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("CREATE TABLE IF NOT EXISTS `Department`("));
    assert!(lines[1].starts_with("CREATE TABLE IF NOT EXISTS `Employee`("));
    assert!(lines[1].contains("FOREIGN KEY(`dept_id`) REFERENCES `Department`(`id`)"));
    assert_eq!(
        lines[2],
        "CREATE INDEX IF NOT EXISTS `salary_index` ON `Employee`(`salary`);"
    );
}

#[test]
fn test_bundle_matches_directory_ddl() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir);
    let bundle = dir.path().join("schema.json");

    let output = sqlweave(&[
        "bundle",
        "--schema",
        arg(&schema),
        "--output",
        arg(&bundle),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Bundled 2 table(s)"));

    let from_dir = sqlweave(&["ddl", "--schema", arg(&schema)]);
    let from_bundle = sqlweave(&["ddl", "--schema", arg(&bundle)]);
    assert!(from_bundle.status.success(), "stderr: {}", stderr(&from_bundle));
    assert_eq!(stdout(&from_dir), stdout(&from_bundle));
}

#[test]
fn test_migrate_then_status() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir);
    let db = dir.path().join("company.db");

    let migrations = dir.path().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(
        migrations.join("2.sql"),
        "INSERT INTO `Department`(`title`) VALUES('R&D');\nALTER TABLE `Employee` ADD COLUMN `email` TEXT;",
    )
    .unwrap();
    let config = dir.path().join("sqlweave.yml");
    fs::write(
        &config,
        "name: company\nversion: 2\njournal_mode: Wal\nmigrations_dir: migrations\n",
    )
    .unwrap();

    let output = sqlweave(&[
        "migrate",
        "--db",
        arg(&db),
        "--schema",
        arg(&schema),
        "--config",
        arg(&config),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Loaded 1 migration file(s)"));
    assert!(text.contains("is at version 2"));

    let output = sqlweave(&["status", "--db", arg(&db), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["version"], 2);
    let tables = report["tables"].as_array().unwrap();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0]["name"], "Department");
    assert_eq!(tables[0]["rows"], 1);
    assert_eq!(tables[1]["name"], "Employee");
    assert_eq!(tables[1]["rows"], 0);

    let output = sqlweave(&["status", "--db", arg(&db)]);
    assert!(stdout(&output).contains("Version: 2"));
}

#[test]
fn test_failed_migration_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let schema = write_schema(&dir);
    let db = dir.path().join("broken.db");
    let migrations = dir.path().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(migrations.join("2.sql"), "THIS IS NOT SQL;").unwrap();
    let config = dir.path().join("sqlweave.yml");
    fs::write(&config, "name: broken\nversion: 2\n").unwrap();

    let output = sqlweave(&[
        "migrate",
        "--db",
        arg(&db),
        "--schema",
        arg(&schema),
        "--config",
        arg(&config),
        "--migrations",
        arg(&migrations),
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).starts_with("error: Migration failed"));
}

#[test]
fn test_missing_inputs_report_errors() {
    let dir = TempDir::new().unwrap();

    let output = sqlweave(&["status", "--db", arg(&dir.path().join("none.db"))]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("does not exist"));

    let output = sqlweave(&["ddl", "--schema", arg(&dir.path().join("none.json"))]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load schema"));
}
