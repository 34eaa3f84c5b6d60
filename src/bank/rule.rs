//! Rule repository.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::graph;
use super::types::{BranchScope, EntityKind, Rule, RuleInput};
use super::{encode_list, list_column, now};
use crate::error::Result;

const COLUMNS: &str = "id, name, created, triggers, content, status, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Rule> {
    let status: String = row.get(5)?;
    Ok(Rule {
        id: row.get(0)?,
        name: row.get(1)?,
        created: row.get(2)?,
        triggers: list_column(row, 3)?,
        content: row.get(4)?,
        status: status.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        governs: Vec::new(),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn get(conn: &Connection, scope: &BranchScope, id: &str) -> Result<Option<Rule>> {
    let rule = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM rules WHERE repository = ?1 AND branch = ?2 AND id = ?3"
            ),
            params![scope.repository, scope.branch, id],
            from_row,
        )
        .optional()?;

    match rule {
        Some(mut r) => {
            r.governs = graph::governed_components(conn, scope, EntityKind::Rule, &r.id)?;
            Ok(Some(r))
        }
        None => Ok(None),
    }
}

pub fn list(
    conn: &Connection,
    scope: &BranchScope,
    limit: usize,
    offset: usize,
) -> Result<Vec<Rule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM rules WHERE repository = ?1 AND branch = ?2 \
         ORDER BY created, id LIMIT ?3 OFFSET ?4"
    ))?;
    let mut rules = stmt
        .query_map(
            params![scope.repository, scope.branch, limit as i64, offset as i64],
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for r in &mut rules {
        r.governs = graph::governed_components(conn, scope, EntityKind::Rule, &r.id)?;
    }
    Ok(rules)
}

/// Write the node and replace its `GOVERNS` edges.
pub fn upsert(conn: &Connection, scope: &BranchScope, input: &RuleInput) -> Result<()> {
    conn.execute(
        "INSERT INTO rules (repository, branch, id, name, created, triggers, content, status, \
                            created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
         ON CONFLICT(repository, branch, id) DO UPDATE SET \
             name = excluded.name, created = excluded.created, triggers = excluded.triggers, \
             content = excluded.content, status = excluded.status, \
             updated_at = excluded.updated_at",
        params![
            scope.repository,
            scope.branch,
            input.id,
            input.name,
            input.created,
            encode_list(&input.triggers),
            input.content,
            input.status.as_str(),
            now(),
        ],
    )?;
    graph::replace_governs(conn, scope, EntityKind::Rule, &input.id, &input.governs)
}
