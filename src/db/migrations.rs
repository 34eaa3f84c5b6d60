//! Forward-only migrations keyed on `schema_meta.schema_version`.
//!
//! [`schema::init_schema`](super::schema::init_schema) lays down version 1.
//! Each later step is an entry in [`MIGRATIONS`] and runs inside its own
//! transaction together with the version bump, so a crash mid-upgrade leaves
//! the database at the last completed version.

use rusqlite::{Connection, OptionalExtension, Transaction};

/// Version this binary reads and writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Memory-bank interchange version stamped into new metadata and exports.
pub const MEMORY_SPEC_VERSION: &str = "3.0.0";

struct Migration {
    /// Version the database is at after this step.
    to: u32,
    name: &'static str,
    apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

const MIGRATIONS: &[Migration] = &[Migration {
    to: 2,
    name: "context date index and memory spec version",
    apply: context_date_index,
}];

fn meta_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM schema_meta WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .optional()
}

/// Stored schema version; 0 if the value is missing or unreadable.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    Ok(meta_value(conn, "schema_version")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

pub fn get_spec_version(conn: &Connection) -> rusqlite::Result<Option<String>> {
    meta_value(conn, "memory_spec_version")
}

/// Apply every migration above the stored version, in order.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let current = get_schema_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.to > current).collect();
    if pending.is_empty() {
        tracing::debug!(schema_version = current, "schema up to date");
        return Ok(());
    }

    for step in pending {
        tracing::info!(to = step.to, migration = step.name, "applying migration");
        let tx = conn.transaction()?;
        (step.apply)(&tx)?;
        tx.execute(
            "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
            [step.to.to_string()],
        )?;
        tx.commit()?;
    }
    Ok(())
}

fn context_date_index(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_contexts_date ON contexts(repository, branch, iso_date);",
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('memory_spec_version', ?1)",
        [MEMORY_SPEC_VERSION],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn migrations_end_at_current_version() {
        assert_eq!(MIGRATIONS.last().map(|m| m.to), Some(CURRENT_SCHEMA_VERSION));
        assert!(MIGRATIONS.windows(2).all(|w| w[0].to < w[1].to));
    }

    #[test]
    fn fresh_schema_starts_at_one() {
        let conn = fresh();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
        assert!(get_spec_version(&conn).unwrap().is_none());
    }

    #[test]
    fn upgrade_adds_index_and_spec_version() {
        let mut conn = fresh();
        run_migrations(&mut conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(get_spec_version(&conn).unwrap().as_deref(), Some(MEMORY_SPEC_VERSION));
        let indexed: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = 'idx_contexts_date')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(indexed);
    }

    #[test]
    fn rerun_is_a_no_op() {
        let mut conn = fresh();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
