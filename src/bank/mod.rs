//! The memory bank: branch-scoped entity repositories, the relationship
//! manager, and the [`service::MemoryService`] orchestrator that composes them.

pub mod component;
pub mod context;
pub mod decision;
pub mod delete;
pub mod file;
pub mod graph;
pub mod introspect;
pub mod metadata;
pub mod rule;
pub mod service;
pub mod tag;
pub mod transfer;
pub mod types;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use types::{BranchScope, EntityKind};

pub use service::MemoryService;

/// Current time as RFC 3339, the timestamp format of every `*_at` column.
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Read a JSON string-array column. A malformed value fails the row instead
/// of reading as an empty list.
pub(crate) fn list_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        let column = row.as_ref().column_name(idx).unwrap_or("?");
        tracing::warn!(column, error = %e, "malformed list column");
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

pub(crate) fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Keep the first occurrence of each id, preserving order.
pub(crate) fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Whether a node of `kind` with `id` exists in the scope.
pub fn exists(conn: &Connection, scope: &BranchScope, kind: EntityKind, id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT 1 FROM {} WHERE repository = ?1 AND branch = ?2 AND id = ?3",
                kind.table()
            ),
            params![scope.repository, scope.branch, id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Ids from `ids` with no node of `kind` in the scope, in input order.
pub fn missing_ids(
    conn: &Connection,
    scope: &BranchScope,
    kind: EntityKind,
    ids: &[String],
) -> Result<Vec<String>> {
    let mut missing = Vec::new();
    for id in dedup_ids(ids) {
        if !exists(conn, scope, kind, &id)? {
            missing.push(id);
        }
    }
    Ok(missing)
}

/// All ids of `kind` in the scope, sorted.
pub fn list_ids(conn: &Connection, scope: &BranchScope, kind: EntityKind) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {} WHERE repository = ?1 AND branch = ?2 ORDER BY id",
        kind.table()
    ))?;
    let ids = stmt
        .query_map(params![scope.repository, scope.branch], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Number of nodes of `kind` in the scope.
pub fn count(conn: &Connection, scope: &BranchScope, kind: EntityKind) -> Result<u64> {
    let n: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE repository = ?1 AND branch = ?2",
            kind.table()
        ),
        params![scope.repository, scope.branch],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}
