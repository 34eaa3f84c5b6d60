//! Component repository and its `DEPENDS_ON` edges.
//!
//! [`upsert`] writes the node and converges the outgoing edge set to exactly
//! the supplied dependency list. It does not validate references; callers run
//! it inside a transaction after checking that every target exists.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::now;
use super::types::{BranchScope, Component, ComponentInput};
use crate::error::Result;

const COLUMNS: &str = "id, name, kind, status, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Component> {
    let status: String = row.get(3)?;
    Ok(Component {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        status: status.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        depends_on: Vec::new(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn get(conn: &Connection, scope: &BranchScope, id: &str) -> Result<Option<Component>> {
    let component = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM components WHERE repository = ?1 AND branch = ?2 AND id = ?3"
            ),
            params![scope.repository, scope.branch, id],
            from_row,
        )
        .optional()?;

    match component {
        Some(mut c) => {
            c.depends_on = dependency_ids(conn, scope, &c.id)?;
            Ok(Some(c))
        }
        None => Ok(None),
    }
}

/// Load the components with the given ids, preserving the order of `ids` and
/// skipping any that do not exist.
pub fn get_many(conn: &Connection, scope: &BranchScope, ids: &[String]) -> Result<Vec<Component>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(c) = get(conn, scope, id)? {
            out.push(c);
        }
    }
    Ok(out)
}

pub fn list(
    conn: &Connection,
    scope: &BranchScope,
    limit: usize,
    offset: usize,
) -> Result<Vec<Component>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM components WHERE repository = ?1 AND branch = ?2 \
         ORDER BY id LIMIT ?3 OFFSET ?4"
    ))?;
    let mut components = stmt
        .query_map(
            params![scope.repository, scope.branch, limit as i64, offset as i64],
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for c in &mut components {
        c.depends_on = dependency_ids(conn, scope, &c.id)?;
    }
    Ok(components)
}

/// Direct dependency targets of `id`, sorted.
pub fn dependency_ids(conn: &Connection, scope: &BranchScope, id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT to_id FROM depends_on WHERE repository = ?1 AND branch = ?2 AND from_id = ?3 \
         ORDER BY to_id",
    )?;
    let ids = stmt
        .query_map(params![scope.repository, scope.branch, id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Write the node and replace its outgoing `DEPENDS_ON` edges.
pub fn upsert(conn: &Connection, scope: &BranchScope, input: &ComponentInput) -> Result<()> {
    let ts = now();
    conn.execute(
        "INSERT INTO components (repository, branch, id, name, kind, status, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
         ON CONFLICT(repository, branch, id) DO UPDATE SET \
             name = excluded.name, kind = excluded.kind, status = excluded.status, \
             updated_at = excluded.updated_at",
        params![
            scope.repository,
            scope.branch,
            input.id,
            input.name,
            input.kind,
            input.status.as_str(),
            ts,
        ],
    )?;

    conn.execute(
        "DELETE FROM depends_on WHERE repository = ?1 AND branch = ?2 AND from_id = ?3",
        params![scope.repository, scope.branch, input.id],
    )?;
    for target in super::dedup_ids(&input.depends_on) {
        conn.execute(
            "INSERT INTO depends_on (repository, branch, from_id, to_id) VALUES (?1, ?2, ?3, ?4)",
            params![scope.repository, scope.branch, input.id, target],
        )?;
    }
    Ok(())
}
