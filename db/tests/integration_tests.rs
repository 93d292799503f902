use std::path::Path;

use sqlweave_core::{
    Column, ConverterRegistry, ForeignKey, SchemaObject, SqlType, Table,
};
use sqlweave_db::{DatabaseConfig, DatabaseError, SchemaSet, SchemaSource};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn department() -> Table {
    Table::new("Department")
        .column(Column::new("id", SqlType::Integer).auto_increment())
        .column(Column::new("title", SqlType::Text))
}

fn employee() -> Table {
    Table::new("Employee")
        .column(Column::new("id", SqlType::Integer).auto_increment())
        .column(Column::new("dept_id", SqlType::Integer))
        .column(Column::new("salary", SqlType::Integer))
        .foreign_key(ForeignKey::new("Department").reference("dept_id", "id"))
        .index("salary_index", ["salary"], false)
}

fn write_table(dir: &Path, table: &Table) {
    let path = dir.join(format!("{}.json", table.name));
    std::fs::write(path, serde_json::to_string_pretty(table).unwrap()).unwrap();
}

// ---------------------------------------------------------------------------
// Directory loading
// ---------------------------------------------------------------------------

#[test]
fn test_directory_to_registry() {
    let dir = tempfile::tempdir().unwrap();
    write_table(dir.path(), &employee());
    write_table(dir.path(), &department());

    let set = SchemaSet::from_dir(dir.path()).unwrap();
    assert_eq!(set.len(), 2);
    // File name order
    assert_eq!(set.names().collect::<Vec<_>>(), ["Department", "Employee"]);

    let registry = set.into_registry(ConverterRegistry::default()).unwrap();
    let order: Vec<&str> = registry
        .creation_order()
        .unwrap()
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(order, ["Department", "Employee"]);

    let ddl = registry.table("Employee").unwrap().create_query().unwrap();
    assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS `Employee`("));
}

#[test]
fn test_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let set = SchemaSet::from_dir(dir.path()).unwrap();
    assert!(set.is_empty());
}

#[test]
fn test_missing_directory() {
    assert!(matches!(
        SchemaSet::from_dir("/nonexistent/sqlweave/schema"),
        Err(DatabaseError::IoError(_))
    ));
}

// ---------------------------------------------------------------------------
// Bundles and fallback
// ---------------------------------------------------------------------------

#[test]
fn test_yaml_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.yaml");
    std::fs::write(
        &path,
        r#"
- name: Tag
  columns:
    - name: id
      type: Integer
      auto_increment: true
    - name: label
      type: Text
      collate: NoCase
  cache:
    enabled: true
    size: 10
    kind: Sparse
"#,
    )
    .unwrap();

    let set = SchemaSet::from_bundle(&path).unwrap();
    let tag = set.get("Tag").unwrap();
    let cache = tag.cache.unwrap();
    assert!(cache.enabled);
    assert_eq!(cache.size, 10);
    assert_eq!(set.source(), &SchemaSource::Bundle(path));
}

#[test]
fn test_fallback_prefers_first_source() {
    let dir = tempfile::tempdir().unwrap();
    let tables = dir.path().join("tables");
    std::fs::create_dir(&tables).unwrap();
    write_table(&tables, &department());

    let bundle = dir.path().join("bundle.json");
    let mut other = SchemaSet::new();
    other.insert(employee());
    other.save_bundle(&bundle).unwrap();

    let set = SchemaSet::builder()
        .from_dir(&tables)
        .from_bundle(&bundle)
        .build()
        .unwrap();
    assert!(set.contains("Department"));
    assert!(!set.contains("Employee"));
}

#[test]
fn test_unregistered_foreign_table_fails_ordering() {
    let mut set = SchemaSet::new();
    set.insert(employee());
    let registry = set.into_registry(ConverterRegistry::default()).unwrap();
    assert!(registry.creation_order().is_err());
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn test_config_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sqlweave.yml");

    let mut config = DatabaseConfig::new("company", 4);
    config.migrations_dir = Some("migrations".into());
    config.save(&path).unwrap();

    let loaded = DatabaseConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(
        loaded.migrations_dir_from(&path),
        Some(dir.path().join("migrations"))
    );
}
