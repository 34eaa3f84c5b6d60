//! SQL DDL for the memory bank property graph.
//!
//! Node tables (`metadata`, `contexts`, `components`, `decisions`, `rules`,
//! `tags`, `files`) and edge tables (`depends_on`, `governs`, `tagged_with`,
//! `belongs_to`) all key on `(repository, branch, ...)`. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Node tables
CREATE TABLE IF NOT EXISTS metadata (
    repository TEXT NOT NULL,
    branch TEXT NOT NULL,
    id TEXT NOT NULL DEFAULT 'meta',
    name TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repository, branch)
);

CREATE TABLE IF NOT EXISTS contexts (
    repository TEXT NOT NULL,
    branch TEXT NOT NULL,
    id TEXT NOT NULL,
    iso_date TEXT NOT NULL,
    agent TEXT,
    summary TEXT NOT NULL DEFAULT '',
    decisions TEXT NOT NULL DEFAULT '[]',
    observations TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repository, branch, id)
);

CREATE TABLE IF NOT EXISTS components (
    repository TEXT NOT NULL,
    branch TEXT NOT NULL,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','deprecated','planned')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repository, branch, id)
);

CREATE TABLE IF NOT EXISTS decisions (
    repository TEXT NOT NULL,
    branch TEXT NOT NULL,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    context TEXT,
    date TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repository, branch, id)
);

CREATE TABLE IF NOT EXISTS rules (
    repository TEXT NOT NULL,
    branch TEXT NOT NULL,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    created TEXT NOT NULL,
    triggers TEXT NOT NULL DEFAULT '[]',
    content TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','deprecated')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repository, branch, id)
);

CREATE TABLE IF NOT EXISTS tags (
    repository TEXT NOT NULL,
    branch TEXT NOT NULL,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    color TEXT,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repository, branch, id)
);

CREATE TABLE IF NOT EXISTS files (
    repository TEXT NOT NULL,
    branch TEXT NOT NULL,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    language TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repository, branch, id)
);

-- Edge tables
CREATE TABLE IF NOT EXISTS depends_on (
    repository TEXT NOT NULL,
    branch TEXT NOT NULL,
    from_id TEXT NOT NULL,
    to_id TEXT NOT NULL,
    PRIMARY KEY (repository, branch, from_id, to_id),
    FOREIGN KEY (repository, branch, from_id)
        REFERENCES components(repository, branch, id) ON DELETE CASCADE,
    FOREIGN KEY (repository, branch, to_id)
        REFERENCES components(repository, branch, id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_depends_on_target ON depends_on(repository, branch, to_id);

CREATE TABLE IF NOT EXISTS governs (
    repository TEXT NOT NULL,
    branch TEXT NOT NULL,
    source_kind TEXT NOT NULL CHECK(source_kind IN ('decision','rule')),
    source_id TEXT NOT NULL,
    component_id TEXT NOT NULL,
    PRIMARY KEY (repository, branch, source_kind, source_id, component_id),
    FOREIGN KEY (repository, branch, component_id)
        REFERENCES components(repository, branch, id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_governs_component ON governs(repository, branch, component_id);

CREATE TABLE IF NOT EXISTS tagged_with (
    repository TEXT NOT NULL,
    branch TEXT NOT NULL,
    item_kind TEXT NOT NULL CHECK(item_kind IN ('component','decision','rule','context','file')),
    item_id TEXT NOT NULL,
    tag_id TEXT NOT NULL,
    PRIMARY KEY (repository, branch, item_kind, item_id, tag_id),
    FOREIGN KEY (repository, branch, tag_id)
        REFERENCES tags(repository, branch, id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_tagged_with_tag ON tagged_with(repository, branch, tag_id);

CREATE TABLE IF NOT EXISTS belongs_to (
    repository TEXT NOT NULL,
    branch TEXT NOT NULL,
    file_id TEXT NOT NULL,
    component_id TEXT NOT NULL,
    PRIMARY KEY (repository, branch, file_id, component_id),
    FOREIGN KEY (repository, branch, file_id)
        REFERENCES files(repository, branch, id) ON DELETE CASCADE,
    FOREIGN KEY (repository, branch, component_id)
        REFERENCES components(repository, branch, id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_belongs_to_component ON belongs_to(repository, branch, component_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "metadata",
            "contexts",
            "components",
            "decisions",
            "rules",
            "tags",
            "files",
            "depends_on",
            "governs",
            "tagged_with",
            "belongs_to",
            "schema_meta",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn component_status_is_checked() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO components (repository, branch, id, name, kind, status, created_at, updated_at) \
             VALUES ('r', 'b', 'c', 'c', 'service', 'retired', 'x', 'x')",
            [],
        );
        assert!(result.is_err());
    }
}
