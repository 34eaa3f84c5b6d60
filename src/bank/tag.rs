//! Tag repository and `TAGGED_WITH` edges.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::now;
use super::types::{BranchScope, EntityKind, ItemRef, Tag, TagInput};
use crate::error::Result;

const COLUMNS: &str = "id, name, color, description, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn get(conn: &Connection, scope: &BranchScope, id: &str) -> Result<Option<Tag>> {
    let tag = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM tags WHERE repository = ?1 AND branch = ?2 AND id = ?3"),
            params![scope.repository, scope.branch, id],
            from_row,
        )
        .optional()?;
    Ok(tag)
}

pub fn list(
    conn: &Connection,
    scope: &BranchScope,
    limit: usize,
    offset: usize,
) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM tags WHERE repository = ?1 AND branch = ?2 \
         ORDER BY id LIMIT ?3 OFFSET ?4"
    ))?;
    let tags = stmt
        .query_map(
            params![scope.repository, scope.branch, limit as i64, offset as i64],
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tags)
}

pub fn upsert(conn: &Connection, scope: &BranchScope, input: &TagInput) -> Result<()> {
    conn.execute(
        "INSERT INTO tags (repository, branch, id, name, color, description, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
         ON CONFLICT(repository, branch, id) DO UPDATE SET \
             name = excluded.name, color = excluded.color, description = excluded.description, \
             updated_at = excluded.updated_at",
        params![
            scope.repository,
            scope.branch,
            input.id,
            input.name,
            input.color,
            input.description,
            now(),
        ],
    )?;
    Ok(())
}

/// Add a `TAGGED_WITH` edge. Returns `false` if it already existed.
pub fn attach(conn: &Connection, scope: &BranchScope, item: &ItemRef, tag_id: &str) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO tagged_with (repository, branch, item_kind, item_id, tag_id) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![scope.repository, scope.branch, item.kind.as_str(), item.id, tag_id],
    )?;
    Ok(inserted > 0)
}

/// Items carrying `tag_id`, ordered by kind then id.
pub fn items_with_tag(conn: &Connection, scope: &BranchScope, tag_id: &str) -> Result<Vec<ItemRef>> {
    let mut stmt = conn.prepare(
        "SELECT item_kind, item_id FROM tagged_with \
         WHERE repository = ?1 AND branch = ?2 AND tag_id = ?3 ORDER BY item_kind, item_id",
    )?;
    let rows = stmt
        .query_map(params![scope.repository, scope.branch, tag_id], |row| {
            let kind: String = row.get(0)?;
            let kind: EntityKind = kind.parse().map_err(|_| rusqlite::Error::InvalidQuery)?;
            Ok(ItemRef::new(kind, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Tag ids attached to `item`, sorted.
pub fn tags_of(conn: &Connection, scope: &BranchScope, item: &ItemRef) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT tag_id FROM tagged_with \
         WHERE repository = ?1 AND branch = ?2 AND item_kind = ?3 AND item_id = ?4 ORDER BY tag_id",
    )?;
    let ids = stmt
        .query_map(
            params![scope.repository, scope.branch, item.kind.as_str(), item.id],
            |row| row.get(0),
        )?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Every `TAGGED_WITH` edge in the scope as `(tag_id, item)`.
pub fn all_assignments(conn: &Connection, scope: &BranchScope) -> Result<Vec<(String, ItemRef)>> {
    let mut stmt = conn.prepare(
        "SELECT tag_id, item_kind, item_id FROM tagged_with \
         WHERE repository = ?1 AND branch = ?2 ORDER BY tag_id, item_kind, item_id",
    )?;
    let rows = stmt
        .query_map(params![scope.repository, scope.branch], |row| {
            let kind: String = row.get(1)?;
            let kind: EntityKind = kind.parse().map_err(|_| rusqlite::Error::InvalidQuery)?;
            Ok((row.get::<_, String>(0)?, ItemRef::new(kind, row.get::<_, String>(2)?)))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
