//! Daily context log repository.
//!
//! One row per day per branch, keyed `ctx-YYYY-MM-DD`. Same-day updates are
//! merged into the existing row rather than creating a new one.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{BranchScope, Context, ContextUpdate};
use super::{encode_list, list_column, now};
use crate::error::Result;

const COLUMNS: &str =
    "id, iso_date, agent, summary, decisions, observations, created_at, updated_at";

/// Id of the context entry for `date`.
pub fn context_id(date: NaiveDate) -> String {
    format!("ctx-{date}")
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Context> {
    Ok(Context {
        id: row.get(0)?,
        iso_date: row.get(1)?,
        agent: row.get(2)?,
        summary: row.get(3)?,
        decisions: list_column(row, 4)?,
        observations: list_column(row, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn get(conn: &Connection, scope: &BranchScope, id: &str) -> Result<Option<Context>> {
    let ctx = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM contexts WHERE repository = ?1 AND branch = ?2 AND id = ?3"
            ),
            params![scope.repository, scope.branch, id],
            from_row,
        )
        .optional()?;
    Ok(ctx)
}

/// The `limit` most recent entries, newest first.
pub fn latest(conn: &Connection, scope: &BranchScope, limit: usize) -> Result<Vec<Context>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM contexts WHERE repository = ?1 AND branch = ?2 \
         ORDER BY iso_date DESC, created_at DESC LIMIT ?3"
    ))?;
    let rows = stmt
        .query_map(params![scope.repository, scope.branch, limit as i64], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Entries whose decision list mentions any of `decision_ids`, oldest first.
pub fn referencing_decisions(
    conn: &Connection,
    scope: &BranchScope,
    decision_ids: &[String],
) -> Result<Vec<Context>> {
    if decision_ids.is_empty() {
        return Ok(Vec::new());
    }
    let wanted = encode_list(decision_ids);
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM contexts c WHERE c.repository = ?1 AND c.branch = ?2 \
         AND EXISTS (SELECT 1 FROM json_each(c.decisions) d \
                     WHERE d.value IN (SELECT value FROM json_each(?3))) \
         ORDER BY c.iso_date, c.created_at"
    ))?;
    let rows = stmt
        .query_map(params![scope.repository, scope.branch, wanted], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// A blank entry for `date`.
pub fn new_for(date: NaiveDate) -> Context {
    let ts = now();
    Context {
        id: context_id(date),
        iso_date: date.to_string(),
        agent: None,
        summary: String::new(),
        decisions: Vec::new(),
        observations: Vec::new(),
        created_at: ts.clone(),
        updated_at: ts,
    }
}

/// Apply `update`: summary and agent overwrite, decisions append without
/// duplicates, observations append.
pub fn merge(ctx: &mut Context, update: &ContextUpdate) {
    if let Some(agent) = &update.agent {
        ctx.agent = Some(agent.clone());
    }
    if let Some(summary) = &update.summary {
        ctx.summary = summary.clone();
    }
    for decision in &update.decisions {
        if !ctx.decisions.contains(decision) {
            ctx.decisions.push(decision.clone());
        }
    }
    ctx.observations.extend(update.observations.iter().cloned());
    ctx.updated_at = now();
}

pub fn save(conn: &Connection, scope: &BranchScope, ctx: &Context) -> Result<()> {
    conn.execute(
        "INSERT INTO contexts (repository, branch, id, iso_date, agent, summary, decisions, \
                               observations, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
         ON CONFLICT(repository, branch, id) DO UPDATE SET \
             agent = excluded.agent, summary = excluded.summary, \
             decisions = excluded.decisions, observations = excluded.observations, \
             updated_at = excluded.updated_at",
        params![
            scope.repository,
            scope.branch,
            ctx.id,
            ctx.iso_date,
            ctx.agent,
            ctx.summary,
            encode_list(&ctx.decisions),
            encode_list(&ctx.observations),
            ctx.created_at,
            ctx.updated_at,
        ],
    )?;
    Ok(())
}

pub fn list(
    conn: &Connection,
    scope: &BranchScope,
    limit: usize,
    offset: usize,
) -> Result<Vec<Context>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM contexts WHERE repository = ?1 AND branch = ?2 \
         ORDER BY iso_date LIMIT ?3 OFFSET ?4"
    ))?;
    let rows = stmt
        .query_map(
            params![scope.repository, scope.branch, limit as i64, offset as i64],
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_id_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(context_id(date), "ctx-2026-03-07");
    }

    #[test]
    fn merge_appends_and_overwrites() {
        let mut ctx = new_for(NaiveDate::from_ymd_opt(2026, 3, 7).unwrap());
        merge(
            &mut ctx,
            &ContextUpdate {
                agent: Some("agent-1".into()),
                summary: Some("first".into()),
                decisions: vec!["dec-1".into()],
                observations: vec!["obs-1".into()],
            },
        );
        merge(
            &mut ctx,
            &ContextUpdate {
                agent: None,
                summary: Some("second".into()),
                decisions: vec!["dec-1".into(), "dec-2".into()],
                observations: vec!["obs-1".into()],
            },
        );

        assert_eq!(ctx.agent.as_deref(), Some("agent-1"));
        assert_eq!(ctx.summary, "second");
        assert_eq!(ctx.decisions, vec!["dec-1", "dec-2"]);
        assert_eq!(ctx.observations, vec!["obs-1", "obs-1"]);
    }
}
