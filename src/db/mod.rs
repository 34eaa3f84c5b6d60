//! Graph engine adapter over embedded SQLite.
//!
//! Entity and edge state lives in the tables defined by [`schema`]. The
//! [`projection`] module materializes named subgraphs over selected node and
//! edge tables, and [`algorithms`] runs graph algorithms over them.

pub mod algorithms;
pub mod migrations;
pub mod projection;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

/// Node tables counted by the health check.
const NODE_TABLES: [&str; 7] = [
    "metadata",
    "contexts",
    "components",
    "decisions",
    "rules",
    "tags",
    "files",
];

const EDGE_TABLES: [&str; 4] = ["depends_on", "governs", "tagged_with", "belongs_to"];

/// Open (or create) the memory bank database at the given path, with schema
/// initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with schema and migrations applied.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub schema_version: u32,
    pub spec_version: Option<String>,
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub node_count: u64,
    pub edge_count: u64,
}

/// Run `PRAGMA integrity_check` and gather row counts across all branches.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn)?;
    let spec_version = migrations::get_spec_version(conn)?;

    let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;

    let node_count = count_rows(conn, &NODE_TABLES)?;
    let edge_count = count_rows(conn, &EDGE_TABLES)?;

    Ok(HealthReport {
        schema_version,
        spec_version,
        integrity_ok: integrity == "ok",
        integrity_details: integrity,
        node_count,
        edge_count,
    })
}

fn count_rows(conn: &Connection, tables: &[&str]) -> Result<u64> {
    let mut total = 0u64;
    for table in tables {
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        total += count as u64;
    }
    Ok(total)
}
