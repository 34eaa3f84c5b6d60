//! Branch statistics and schema introspection.
//!
//! Counts and node listings are always filtered by scope. Property and index
//! introspection describe the shared schema and carry no row data.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection};
use serde::Serialize;

use super::types::{BranchScope, EntityKind};
use super::{context, count, metadata};
use crate::db::projection::{EdgeTable, GraphNode};
use crate::error::{BankError, Result};

/// Response from `memory_bank_stats`.
#[derive(Debug, Serialize)]
pub struct BankStats {
    pub repository: String,
    pub branch: String,
    pub initialized: bool,
    pub nodes: BTreeMap<&'static str, u64>,
    pub edges: BTreeMap<&'static str, u64>,
    pub total_nodes: u64,
    pub total_edges: u64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_context: Option<String>,
}

pub fn stats(conn: &Connection, scope: &BranchScope, db_path: Option<&Path>) -> Result<BankStats> {
    let mut nodes = BTreeMap::new();
    for kind in EntityKind::ALL {
        nodes.insert(kind.label(), count(conn, scope, kind)?);
    }
    let mut edges = BTreeMap::new();
    for table in EdgeTable::ALL {
        edges.insert(table.as_str(), count_edges(conn, scope, table)?);
    }

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(BankStats {
        repository: scope.repository.clone(),
        branch: scope.branch.clone(),
        initialized: metadata::get(conn, scope)?.is_some(),
        total_nodes: nodes.values().sum(),
        total_edges: edges.values().sum(),
        nodes,
        edges,
        db_size_bytes,
        latest_context: context::latest(conn, scope, 1)?
            .into_iter()
            .next()
            .map(|c| c.iso_date),
    })
}

fn count_edges(conn: &Connection, scope: &BranchScope, table: EdgeTable) -> Result<u64> {
    let n: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE repository = ?1 AND branch = ?2",
            table.table()
        ),
        params![scope.repository, scope.branch],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Parse a node label, reporting unknown labels against `field`.
pub fn parse_label(field: &str, label: &str) -> Result<EntityKind> {
    EntityKind::from_label(label.trim())
        .ok_or_else(|| BankError::validation(field, format!("unknown node label: {label}")))
}

#[derive(Debug, Serialize)]
pub struct NodePage {
    pub label: &'static str,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
    pub nodes: Vec<GraphNode>,
}

pub fn list_nodes_by_label(
    conn: &Connection,
    scope: &BranchScope,
    kind: EntityKind,
    limit: usize,
    offset: usize,
) -> Result<NodePage> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, {} FROM {} WHERE repository = ?1 AND branch = ?2 \
         ORDER BY id LIMIT ?3 OFFSET ?4",
        kind.display_column(),
        kind.table()
    ))?;
    let nodes = stmt
        .query_map(
            params![scope.repository, scope.branch, limit as i64, offset as i64],
            |row| {
                Ok(GraphNode {
                    id: row.get(0)?,
                    label: kind.label(),
                    name: row.get(1)?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(NodePage {
        label: kind.label(),
        total: count(conn, scope, kind)?,
        limit,
        offset,
        nodes,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Columns of the node table behind `kind`, in declaration order.
pub fn node_properties(conn: &Connection, kind: EntityKind) -> Result<Vec<PropertyInfo>> {
    let mut stmt =
        conn.prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid")?;
    let props = stmt
        .query_map(params![kind.table()], |row| {
            Ok(PropertyInfo {
                name: row.get(0)?,
                data_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                primary_key: row.get::<_, i64>(3)? != 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(props)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub table: String,
    pub unique: bool,
    /// `pk` for primary keys, `u` for UNIQUE constraints, `c` for created indexes.
    pub origin: String,
    pub columns: Vec<String>,
}

/// Every index on the node and edge tables, primary keys included.
pub fn list_indexes(conn: &Connection) -> Result<Vec<IndexInfo>> {
    let tables = EntityKind::ALL
        .iter()
        .map(|k| k.table())
        .chain(EdgeTable::ALL.iter().map(|t| t.table()))
        .chain(std::iter::once("metadata"));

    let mut out = Vec::new();
    for table in tables {
        let mut stmt = conn.prepare(
            "SELECT name, \"unique\", origin FROM pragma_index_list(?1) ORDER BY name",
        )?;
        let indexes = stmt
            .query_map(params![table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? != 0,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for (name, unique, origin) in indexes {
            let mut cols =
                conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
            let columns = cols
                .query_map(params![name], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            out.push(IndexInfo {
                name,
                table: table.to_string(),
                unique,
                origin,
                columns,
            });
        }
    }
    Ok(out)
}
