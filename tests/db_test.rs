mod helpers;

use memory_bank::bank::MemoryService;
use memory_bank::db::{self, migrations};
use tempfile::TempDir;

#[test]
fn open_database_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("bank.db");

    let conn = db::open_database(&path).unwrap();
    assert!(path.exists());

    let timeout: i64 = conn
        .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
    let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
    assert_eq!(fk, 1);
}

#[test]
fn reopening_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bank.db");
    drop(db::open_database(&path).unwrap());

    let mut conn = db::open_database(&path).unwrap();
    migrations::run_migrations(&mut conn).unwrap();
    assert_eq!(
        migrations::get_schema_version(&conn).unwrap(),
        migrations::CURRENT_SCHEMA_VERSION
    );
    assert_eq!(
        migrations::get_spec_version(&conn).unwrap().as_deref(),
        Some(migrations::MEMORY_SPEC_VERSION)
    );
}

#[test]
fn data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bank.db");
    let scope = helpers::scope("acme", "main");
    {
        let bank = MemoryService::open(&path).unwrap();
        bank.upsert_component(&scope, &helpers::component("a", &[])).unwrap();
        bank.upsert_component(&scope, &helpers::component("b", &["a"])).unwrap();
    }

    let bank = MemoryService::open(&path).unwrap();
    assert_eq!(bank.dependents(&scope, "a").unwrap().len(), 1);
    assert!(bank.stats(&scope).unwrap().db_size_bytes > 0);
}

#[test]
fn health_check_counts_rows_across_branches() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bank.db");
    {
        let bank = MemoryService::open(&path).unwrap();
        for branch in ["main", "dev"] {
            let scope = helpers::scope("acme", branch);
            bank.upsert_component(&scope, &helpers::component("a", &[])).unwrap();
            bank.upsert_component(&scope, &helpers::component("b", &["a"])).unwrap();
        }
    }

    let conn = db::open_database(&path).unwrap();
    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.node_count, 4);
    assert_eq!(report.edge_count, 2);
    assert_eq!(report.schema_version, migrations::CURRENT_SCHEMA_VERSION);
}

#[test]
fn indexes_include_scope_lookups() {
    let bank = helpers::test_bank();
    let indexes = bank.list_indexes().unwrap();
    assert!(indexes.iter().any(|i| i.name == "idx_contexts_date"));
}
