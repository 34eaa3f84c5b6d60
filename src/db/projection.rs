//! Named projected subgraphs.
//!
//! A projection materializes the nodes of selected node tables and the edges
//! of selected edge tables for one branch into a `petgraph` digraph that the
//! traversal and algorithm code in [`super::algorithms`] runs over.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use rusqlite::{params, Connection};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bank::types::{BranchScope, EntityKind};

/// Edge tables that can be projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum EdgeTable {
    #[serde(rename = "DEPENDS_ON")]
    DependsOn,
    #[serde(rename = "GOVERNS")]
    Governs,
    #[serde(rename = "TAGGED_WITH")]
    TaggedWith,
    #[serde(rename = "BELONGS_TO")]
    BelongsTo,
}

impl EdgeTable {
    pub const ALL: [EdgeTable; 4] = [
        Self::DependsOn,
        Self::Governs,
        Self::TaggedWith,
        Self::BelongsTo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DependsOn => "DEPENDS_ON",
            Self::Governs => "GOVERNS",
            Self::TaggedWith => "TAGGED_WITH",
            Self::BelongsTo => "BELONGS_TO",
        }
    }

    /// Backing SQL table.
    pub fn table(&self) -> &'static str {
        match self {
            Self::DependsOn => "depends_on",
            Self::Governs => "governs",
            Self::TaggedWith => "tagged_with",
            Self::BelongsTo => "belongs_to",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(name))
    }

    /// Node kinds an edge of this table can touch.
    pub fn endpoint_kinds(&self) -> &'static [EntityKind] {
        match self {
            Self::DependsOn => &[EntityKind::Component],
            Self::Governs => &[EntityKind::Decision, EntityKind::Rule, EntityKind::Component],
            Self::TaggedWith => &EntityKind::ALL,
            Self::BelongsTo => &[EntityKind::File, EntityKind::Component],
        }
    }
}

/// Which way edges are followed during traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Both,
}

/// A projected node, addressed by label and id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: &'static str,
    pub name: String,
}

/// Directed graph of one projection. Node weights are the projected nodes,
/// edge weights the table each edge came from.
pub type Projection = DiGraph<GraphNode, EdgeTable>;

#[derive(Debug)]
pub struct ProjectedGraph {
    pub name: String,
    pub graph: Projection,
    index: HashMap<(EntityKind, String), NodeIndex>,
}

impl ProjectedGraph {
    /// Materialize the projection for one branch. Edges whose endpoints fall
    /// outside the selected node tables are dropped; parallel edges collapse.
    pub fn project(
        conn: &Connection,
        scope: &BranchScope,
        name: &str,
        node_tables: &[EntityKind],
        edge_tables: &[EdgeTable],
    ) -> rusqlite::Result<Self> {
        let mut projected = ProjectedGraph {
            name: name.to_string(),
            graph: Projection::new(),
            index: HashMap::new(),
        };

        let mut kinds = node_tables.to_vec();
        kinds.sort();
        kinds.dedup();
        for kind in kinds {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, {} FROM {} WHERE repository = ?1 AND branch = ?2 ORDER BY id",
                kind.display_column(),
                kind.table()
            ))?;
            let rows = stmt
                .query_map(params![scope.repository, scope.branch], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (id, display) in rows {
                let node = projected.graph.add_node(GraphNode {
                    id: id.clone(),
                    label: kind.label(),
                    name: display,
                });
                projected.index.insert((kind, id), node);
            }
        }

        let mut seen = Vec::with_capacity(edge_tables.len());
        for &table in edge_tables {
            if seen.contains(&table) {
                continue;
            }
            seen.push(table);
            for ((src_kind, src), (dst_kind, dst)) in load_edges(conn, scope, table)? {
                let from = projected.index.get(&(src_kind, src));
                let to = projected.index.get(&(dst_kind, dst));
                if let (Some(&from), Some(&to)) = (from, to) {
                    projected.graph.update_edge(from, to, table);
                }
            }
        }

        tracing::debug!(
            projection = %projected.name,
            scope = %scope,
            nodes = projected.graph.node_count(),
            edges = projected.graph.edge_count(),
            "projected subgraph"
        );
        Ok(projected)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, index: NodeIndex) -> &GraphNode {
        &self.graph[index]
    }

    /// Projected nodes in insertion order, which is label then id.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> + '_ {
        self.graph.node_weights()
    }

    pub fn index_of(&self, kind: EntityKind, id: &str) -> Option<NodeIndex> {
        self.index.get(&(kind, id.to_string())).copied()
    }

    /// Every node carrying `id`, one per kind that uses it.
    pub fn matching(&self, id: &str) -> Vec<(EntityKind, NodeIndex)> {
        EntityKind::ALL
            .into_iter()
            .filter_map(|kind| self.index_of(kind, id).map(|n| (kind, n)))
            .collect()
    }
}

type Endpoint = (EntityKind, String);

fn load_edges(
    conn: &Connection,
    scope: &BranchScope,
    table: EdgeTable,
) -> rusqlite::Result<Vec<(Endpoint, Endpoint)>> {
    let sql = match table {
        EdgeTable::DependsOn => {
            "SELECT 'component', from_id, 'component', to_id FROM depends_on \
             WHERE repository = ?1 AND branch = ?2"
        }
        EdgeTable::Governs => {
            "SELECT source_kind, source_id, 'component', component_id FROM governs \
             WHERE repository = ?1 AND branch = ?2"
        }
        EdgeTable::TaggedWith => {
            "SELECT item_kind, item_id, 'tag', tag_id FROM tagged_with \
             WHERE repository = ?1 AND branch = ?2"
        }
        EdgeTable::BelongsTo => {
            "SELECT 'file', file_id, 'component', component_id FROM belongs_to \
             WHERE repository = ?1 AND branch = ?2"
        }
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![scope.repository, scope.branch], |row| {
            let src_kind: String = row.get(0)?;
            let dst_kind: String = row.get(2)?;
            let src_kind = EntityKind::from_label(&src_kind).ok_or(rusqlite::Error::InvalidQuery)?;
            let dst_kind = EntityKind::from_label(&dst_kind).ok_or(rusqlite::Error::InvalidQuery)?;
            Ok((
                (src_kind, row.get::<_, String>(1)?),
                (dst_kind, row.get::<_, String>(3)?),
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_table_names_parse_case_insensitively() {
        assert_eq!(EdgeTable::from_name("depends_on"), Some(EdgeTable::DependsOn));
        assert_eq!(EdgeTable::from_name("GOVERNS"), Some(EdgeTable::Governs));
        assert_eq!(EdgeTable::from_name("OWNS"), None);
    }

    #[test]
    fn projection_keeps_branch_boundary() {
        let conn = crate::db::open_in_memory().unwrap();
        conn.execute_batch(
            "INSERT INTO components VALUES ('r','main','a','A','service','active','t','t');
             INSERT INTO components VALUES ('r','main','b','B','service','active','t','t');
             INSERT INTO components VALUES ('r','dev','a','A','service','active','t','t');
             INSERT INTO components VALUES ('r','dev','c','C','service','active','t','t');
             INSERT INTO depends_on VALUES ('r','main','b','a');
             INSERT INTO depends_on VALUES ('r','dev','c','a');",
        )
        .unwrap();

        let scope = BranchScope::new("r", "main").unwrap();
        let graph = ProjectedGraph::project(
            &conn,
            &scope,
            "deps",
            &[EntityKind::Component],
            &[EdgeTable::DependsOn],
        )
        .unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        let b = graph.index_of(EntityKind::Component, "b").unwrap();
        let a = graph.index_of(EntityKind::Component, "a").unwrap();
        assert!(graph.graph.contains_edge(b, a));
        assert!(!graph.graph.contains_edge(a, b));
        assert!(graph.index_of(EntityKind::Component, "c").is_none());
    }

    #[test]
    fn shared_ids_match_every_kind() {
        let conn = crate::db::open_in_memory().unwrap();
        conn.execute_batch(
            "INSERT INTO components VALUES ('r','main','x','X','service','active','t','t');
             INSERT INTO decisions VALUES ('r','main','x','X',NULL,'2026-01-01','t','t');",
        )
        .unwrap();
        let scope = BranchScope::new("r", "main").unwrap();
        let graph = ProjectedGraph::project(
            &conn,
            &scope,
            "all",
            &[EntityKind::Component, EntityKind::Decision],
            &[EdgeTable::Governs],
        )
        .unwrap();

        let kinds: Vec<EntityKind> = graph.matching("x").into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![EntityKind::Component, EntityKind::Decision]);
        assert!(graph.matching("y").is_empty());
    }
}
