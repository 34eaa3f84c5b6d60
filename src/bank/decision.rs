//! Decision repository.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::graph;
use super::now;
use super::types::{BranchScope, Decision, DecisionInput, EntityKind};
use crate::error::Result;

const COLUMNS: &str = "id, name, context, date, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Decision> {
    Ok(Decision {
        id: row.get(0)?,
        name: row.get(1)?,
        context: row.get(2)?,
        date: row.get(3)?,
        governs: Vec::new(),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn get(conn: &Connection, scope: &BranchScope, id: &str) -> Result<Option<Decision>> {
    let decision = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM decisions WHERE repository = ?1 AND branch = ?2 AND id = ?3"
            ),
            params![scope.repository, scope.branch, id],
            from_row,
        )
        .optional()?;

    match decision {
        Some(mut d) => {
            d.governs = graph::governed_components(conn, scope, EntityKind::Decision, &d.id)?;
            Ok(Some(d))
        }
        None => Ok(None),
    }
}

pub fn list(
    conn: &Connection,
    scope: &BranchScope,
    limit: usize,
    offset: usize,
) -> Result<Vec<Decision>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM decisions WHERE repository = ?1 AND branch = ?2 \
         ORDER BY date, id LIMIT ?3 OFFSET ?4"
    ))?;
    let mut decisions = stmt
        .query_map(
            params![scope.repository, scope.branch, limit as i64, offset as i64],
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for d in &mut decisions {
        d.governs = graph::governed_components(conn, scope, EntityKind::Decision, &d.id)?;
    }
    Ok(decisions)
}

/// Write the node and replace its `GOVERNS` edges.
pub fn upsert(conn: &Connection, scope: &BranchScope, input: &DecisionInput) -> Result<()> {
    conn.execute(
        "INSERT INTO decisions (repository, branch, id, name, context, date, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
         ON CONFLICT(repository, branch, id) DO UPDATE SET \
             name = excluded.name, context = excluded.context, date = excluded.date, \
             updated_at = excluded.updated_at",
        params![
            scope.repository,
            scope.branch,
            input.id,
            input.name,
            input.context,
            input.date,
            now(),
        ],
    )?;
    graph::replace_governs(conn, scope, EntityKind::Decision, &input.id, &input.governs)
}
