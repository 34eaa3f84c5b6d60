//! Source file repository and `BELONGS_TO` edges to components.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::now;
use super::types::{BranchScope, File, FileInput};
use crate::error::Result;

const COLUMNS: &str = "id, name, path, language, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<File> {
    Ok(File {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        language: row.get(3)?,
        components: Vec::new(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn get(conn: &Connection, scope: &BranchScope, id: &str) -> Result<Option<File>> {
    let file = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM files WHERE repository = ?1 AND branch = ?2 AND id = ?3"),
            params![scope.repository, scope.branch, id],
            from_row,
        )
        .optional()?;
    match file {
        Some(mut f) => {
            f.components = owning_components(conn, scope, &f.id)?;
            Ok(Some(f))
        }
        None => Ok(None),
    }
}

pub fn list(
    conn: &Connection,
    scope: &BranchScope,
    limit: usize,
    offset: usize,
) -> Result<Vec<File>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM files WHERE repository = ?1 AND branch = ?2 \
         ORDER BY path, id LIMIT ?3 OFFSET ?4"
    ))?;
    let mut files = stmt
        .query_map(
            params![scope.repository, scope.branch, limit as i64, offset as i64],
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for f in &mut files {
        f.components = owning_components(conn, scope, &f.id)?;
    }
    Ok(files)
}

/// Write the node. Existing `BELONGS_TO` edges are kept.
pub fn upsert(conn: &Connection, scope: &BranchScope, input: &FileInput) -> Result<()> {
    conn.execute(
        "INSERT INTO files (repository, branch, id, name, path, language, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
         ON CONFLICT(repository, branch, id) DO UPDATE SET \
             name = excluded.name, path = excluded.path, language = excluded.language, \
             updated_at = excluded.updated_at",
        params![
            scope.repository,
            scope.branch,
            input.id,
            input.name,
            input.path,
            input.language,
            now(),
        ],
    )?;
    Ok(())
}

/// Add a `BELONGS_TO` edge. Returns `false` if it already existed.
pub fn associate(
    conn: &Connection,
    scope: &BranchScope,
    file_id: &str,
    component_id: &str,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO belongs_to (repository, branch, file_id, component_id) \
         VALUES (?1, ?2, ?3, ?4)",
        params![scope.repository, scope.branch, file_id, component_id],
    )?;
    Ok(inserted > 0)
}

/// Components owning `file_id`, sorted.
pub fn owning_components(conn: &Connection, scope: &BranchScope, file_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT component_id FROM belongs_to \
         WHERE repository = ?1 AND branch = ?2 AND file_id = ?3 ORDER BY component_id",
    )?;
    let ids = stmt
        .query_map(params![scope.repository, scope.branch, file_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Files belonging to `component_id`, ordered by path.
pub fn files_for_component(
    conn: &Connection,
    scope: &BranchScope,
    component_id: &str,
) -> Result<Vec<File>> {
    let mut stmt = conn.prepare(
        "SELECT f.id, f.name, f.path, f.language, f.created_at, f.updated_at \
         FROM files f JOIN belongs_to b \
           ON b.repository = f.repository AND b.branch = f.branch AND b.file_id = f.id \
         WHERE f.repository = ?1 AND f.branch = ?2 AND b.component_id = ?3 \
         ORDER BY f.path, f.id",
    )?;
    let mut files = stmt
        .query_map(params![scope.repository, scope.branch, component_id], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for f in &mut files {
        f.components = owning_components(conn, scope, &f.id)?;
    }
    Ok(files)
}
