//! Graph relationship manager.
//!
//! Maintains the `GOVERNS` edges shared by decisions and rules and answers
//! every traversal: dependencies, dependents, shortest path, k-hop
//! neighborhoods, governance, contextual history, and the algorithm requests
//! that run over a projected subgraph.

use petgraph::graph::NodeIndex;
use rusqlite::{params, Connection};
use serde::Serialize;

use super::types::{BranchScope, Component, Context, Decision, EntityKind, Rule};
use super::{component, context, decision, exists, rule};
use crate::db::algorithms::{self, PageRankConfig};
use crate::db::projection::{Direction, EdgeTable, GraphNode, ProjectedGraph};
use crate::error::{BankError, FieldError, Result};

fn traversal(e: rusqlite::Error) -> BankError {
    BankError::engine("traversal", e)
}

// ---------------------------------------------------------------------------
// GOVERNS edges
// ---------------------------------------------------------------------------

/// Components governed by the decision or rule `id`, sorted.
pub fn governed_components(
    conn: &Connection,
    scope: &BranchScope,
    kind: EntityKind,
    id: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT component_id FROM governs \
         WHERE repository = ?1 AND branch = ?2 AND source_kind = ?3 AND source_id = ?4 \
         ORDER BY component_id",
    )?;
    let ids = stmt
        .query_map(
            params![scope.repository, scope.branch, kind.as_str(), id],
            |row| row.get(0),
        )?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Converge the `GOVERNS` edges of a decision or rule to exactly `components`.
pub fn replace_governs(
    conn: &Connection,
    scope: &BranchScope,
    kind: EntityKind,
    id: &str,
    components: &[String],
) -> Result<()> {
    conn.execute(
        "DELETE FROM governs \
         WHERE repository = ?1 AND branch = ?2 AND source_kind = ?3 AND source_id = ?4",
        params![scope.repository, scope.branch, kind.as_str(), id],
    )?;
    for target in super::dedup_ids(components) {
        conn.execute(
            "INSERT INTO governs (repository, branch, source_kind, source_id, component_id) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![scope.repository, scope.branch, kind.as_str(), id, target],
        )?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GoverningItems {
    pub decisions: Vec<Decision>,
    pub rules: Vec<Rule>,
}

/// Decisions and rules with a `GOVERNS` edge to `component_id`.
pub fn governing_items(
    conn: &Connection,
    scope: &BranchScope,
    component_id: &str,
) -> Result<GoverningItems> {
    require_component(conn, scope, component_id)?;
    let mut stmt = conn
        .prepare(
            "SELECT source_kind, source_id FROM governs \
             WHERE repository = ?1 AND branch = ?2 AND component_id = ?3 \
             ORDER BY source_kind, source_id",
        )
        .map_err(traversal)?;
    let sources = stmt
        .query_map(params![scope.repository, scope.branch, component_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(traversal)?;

    let mut items = GoverningItems::default();
    for (kind, id) in sources {
        match kind.as_str() {
            "decision" => items.decisions.extend(decision::get(conn, scope, &id)?),
            "rule" => items.rules.extend(rule::get(conn, scope, &id)?),
            _ => {}
        }
    }
    Ok(items)
}

// ---------------------------------------------------------------------------
// Traversals
// ---------------------------------------------------------------------------

fn require_component(conn: &Connection, scope: &BranchScope, id: &str) -> Result<()> {
    if exists(conn, scope, EntityKind::Component, id)? {
        Ok(())
    } else {
        Err(BankError::not_found("component", id))
    }
}

/// Validate a caller-supplied hop count. Absent means 1.
pub fn check_depth(depth: Option<i64>) -> Result<usize> {
    match depth {
        None => Ok(1),
        Some(d) if d > 0 => Ok(d as usize),
        Some(_) => Err(BankError::validation("depth", "must be a positive integer")),
    }
}

/// Components reachable from `component_id` along outgoing `DEPENDS_ON`
/// edges within `depth` hops, ordered by hop distance then id.
pub fn dependencies(
    conn: &Connection,
    scope: &BranchScope,
    component_id: &str,
    depth: usize,
) -> Result<Vec<Component>> {
    require_component(conn, scope, component_id)?;
    let mut stmt = conn
        .prepare(
            "WITH RECURSIVE reach(id, hops) AS ( \
                 SELECT to_id, 1 FROM depends_on \
                 WHERE repository = ?1 AND branch = ?2 AND from_id = ?3 \
                 UNION \
                 SELECT d.to_id, r.hops + 1 FROM depends_on d JOIN reach r ON d.from_id = r.id \
                 WHERE d.repository = ?1 AND d.branch = ?2 AND r.hops < ?4 \
             ) \
             SELECT id, MIN(hops) AS hops FROM reach WHERE id <> ?3 \
             GROUP BY id ORDER BY hops, id",
        )
        .map_err(traversal)?;
    let ids = stmt
        .query_map(
            params![scope.repository, scope.branch, component_id, depth as i64],
            |row| row.get::<_, String>(0),
        )
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(traversal)?;
    component::get_many(conn, scope, &ids)
}

/// Components with a direct `DEPENDS_ON` edge to `component_id`. One hop only.
pub fn dependents(
    conn: &Connection,
    scope: &BranchScope,
    component_id: &str,
) -> Result<Vec<Component>> {
    require_component(conn, scope, component_id)?;
    let mut stmt = conn
        .prepare(
            "SELECT from_id FROM depends_on \
             WHERE repository = ?1 AND branch = ?2 AND to_id = ?3 ORDER BY from_id",
        )
        .map_err(traversal)?;
    let ids = stmt
        .query_map(params![scope.repository, scope.branch, component_id], |row| {
            row.get::<_, String>(0)
        })
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(traversal)?;
    component::get_many(conn, scope, &ids)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    pub path_found: bool,
    pub path: Vec<GraphNode>,
    /// Number of edges on the path.
    pub length: usize,
}

impl PathResult {
    fn none() -> Self {
        Self {
            path_found: false,
            path: Vec::new(),
            length: 0,
        }
    }
}

/// Node kinds touched by any of `tables`, sorted and unique.
fn kinds_for(tables: &[EdgeTable]) -> Vec<EntityKind> {
    let mut kinds: Vec<EntityKind> = tables
        .iter()
        .flat_map(|t| t.endpoint_kinds().iter().copied())
        .collect();
    kinds.sort();
    kinds.dedup();
    kinds
}

fn edge_tables_or_default(tables: &[EdgeTable]) -> Vec<EdgeTable> {
    if tables.is_empty() {
        vec![EdgeTable::DependsOn]
    } else {
        tables.to_vec()
    }
}

/// One end of a path query: an id, optionally pinned to a node kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEnd {
    pub id: String,
    pub kind: Option<EntityKind>,
}

impl PathEnd {
    pub fn new(id: impl Into<String>, kind: Option<EntityKind>) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

impl From<&str> for PathEnd {
    fn from(id: &str) -> Self {
        Self::new(id, None)
    }
}

/// Resolve a path end to one projected node. A bare id carried by nodes of
/// more than one kind is rejected instead of guessed.
fn locate(graph: &ProjectedGraph, end: &PathEnd, field: &str) -> Result<NodeIndex> {
    if let Some(kind) = end.kind {
        return graph
            .index_of(kind, &end.id)
            .ok_or_else(|| BankError::not_found(kind.as_str(), end.id.as_str()));
    }
    match graph.matching(&end.id).as_slice() {
        [] => Err(BankError::not_found("node", end.id.as_str())),
        [(_, node)] => Ok(*node),
        many => {
            let kinds: Vec<&str> = many.iter().map(|(kind, _)| kind.as_str()).collect();
            Err(BankError::Validation(vec![FieldError::new(
                format!("{field}_type"),
                format!(
                    "id '{}' is used by several node kinds ({}); name one",
                    end.id,
                    kinds.join(", ")
                ),
            )]))
        }
    }
}

/// Shortest path from `start` to `end` over `relationship_types`
/// (default `DEPENDS_ON`). A node is never a path to itself: the same id
/// reports no path without consulting the graph, unless both ends pin
/// different kinds.
pub fn shortest_path(
    conn: &Connection,
    scope: &BranchScope,
    start: &PathEnd,
    end: &PathEnd,
    relationship_types: &[EdgeTable],
    direction: Direction,
) -> Result<PathResult> {
    let distinct_kinds = matches!((start.kind, end.kind), (Some(a), Some(b)) if a != b);
    if start.id == end.id && !distinct_kinds {
        return Ok(PathResult::none());
    }
    let tables = edge_tables_or_default(relationship_types);
    let mut kinds = kinds_for(&tables);
    kinds.extend(start.kind.iter().chain(end.kind.iter()).copied());
    let graph = ProjectedGraph::project(conn, scope, "shortest_path", &kinds, &tables)
        .map_err(traversal)?;
    let from = locate(&graph, start, "start_node")?;
    let to = locate(&graph, end, "end_node")?;

    match algorithms::shortest_path(&graph.graph, from, to, direction) {
        Some(indices) => {
            let path: Vec<GraphNode> = indices.iter().map(|&i| graph.node(i).clone()).collect();
            Ok(PathResult {
                path_found: true,
                length: path.len() - 1,
                path,
            })
        }
        None => Ok(PathResult::none()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedItem {
    #[serde(flatten)]
    pub node: GraphNode,
    pub distance: usize,
}

/// Every node within `depth` hops of `component_id`, ordered by distance.
pub fn related_items(
    conn: &Connection,
    scope: &BranchScope,
    component_id: &str,
    depth: usize,
    relationship_types: &[EdgeTable],
    direction: Direction,
) -> Result<Vec<RelatedItem>> {
    require_component(conn, scope, component_id)?;
    let tables = if relationship_types.is_empty() {
        EdgeTable::ALL.to_vec()
    } else {
        relationship_types.to_vec()
    };
    let mut kinds = kinds_for(&tables);
    if !kinds.contains(&EntityKind::Component) {
        kinds.push(EntityKind::Component);
    }
    let graph = ProjectedGraph::project(conn, scope, "related_items", &kinds, &tables)
        .map_err(traversal)?;
    let Some(start) = graph.index_of(EntityKind::Component, component_id) else {
        return Err(BankError::not_found("component", component_id));
    };

    let mut items: Vec<RelatedItem> = algorithms::within_hops(&graph.graph, start, depth, direction)
        .into_iter()
        .map(|(i, distance)| RelatedItem {
            node: graph.node(i).clone(),
            distance,
        })
        .collect();
    items.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.node.label.cmp(b.node.label))
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    Ok(items)
}

/// Contexts relevant to an item: for a decision, the entries that list it;
/// for a component, the entries that list any decision governing it.
pub fn contextual_history(
    conn: &Connection,
    scope: &BranchScope,
    item_id: &str,
    item_kind: EntityKind,
) -> Result<Vec<Context>> {
    let decision_ids = match item_kind {
        EntityKind::Decision => {
            if !exists(conn, scope, EntityKind::Decision, item_id)? {
                return Err(BankError::not_found("decision", item_id));
            }
            vec![item_id.to_string()]
        }
        EntityKind::Component => {
            require_component(conn, scope, item_id)?;
            governing_items(conn, scope, item_id)?
                .decisions
                .into_iter()
                .map(|d| d.id)
                .collect()
        }
        _ => {
            return Err(BankError::validation(
                "item_type",
                "must be component or decision",
            ))
        }
    };
    context::referencing_decisions(conn, scope, &decision_ids)
}

// ---------------------------------------------------------------------------
// Algorithm requests over a projected subgraph
// ---------------------------------------------------------------------------

/// Named projection over caller-supplied table names.
#[derive(Debug, Clone)]
pub struct ProjectionRequest {
    pub name: String,
    pub node_tables: Vec<String>,
    pub edge_tables: Vec<String>,
}

impl ProjectionRequest {
    /// Resolve table names, reporting every unknown or missing one.
    pub fn resolve(&self) -> Result<(Vec<EntityKind>, Vec<EdgeTable>)> {
        let mut fields = Vec::new();
        if self.name.trim().is_empty() {
            fields.push(FieldError::new("projected_graph_name", "must not be empty"));
        }
        if self.node_tables.is_empty() {
            fields.push(FieldError::new("node_table_names", "must not be empty"));
        }
        if self.edge_tables.is_empty() {
            fields.push(FieldError::new("relationship_table_names", "must not be empty"));
        }

        let mut kinds = Vec::new();
        for name in &self.node_tables {
            match EntityKind::from_label(name) {
                Some(kind) => kinds.push(kind),
                None => fields.push(FieldError::new(
                    "node_table_names",
                    format!("unknown node table: {name}"),
                )),
            }
        }
        let mut tables = Vec::new();
        for name in &self.edge_tables {
            match EdgeTable::from_name(name) {
                Some(table) => tables.push(table),
                None => fields.push(FieldError::new(
                    "relationship_table_names",
                    format!("unknown relationship table: {name}"),
                )),
            }
        }

        if fields.is_empty() {
            Ok((kinds, tables))
        } else {
            Err(BankError::Validation(fields))
        }
    }

    fn project(&self, conn: &Connection, scope: &BranchScope) -> Result<ProjectedGraph> {
        let (kinds, tables) = self.resolve()?;
        ProjectedGraph::project(conn, scope, &self.name, &kinds, &tables).map_err(traversal)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedNode {
    #[serde(flatten)]
    pub node: GraphNode,
    pub rank: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    pub component_id: usize,
    pub nodes: Vec<GraphNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreNode {
    #[serde(flatten)]
    pub node: GraphNode,
    pub core_number: usize,
}

/// Uniform envelope for every algorithm result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmResult {
    pub status: &'static str,
    pub projected_graph_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranks: Option<Vec<RankedNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<NodeGroup>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<CoreNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modularity: Option<f64>,
}

impl AlgorithmResult {
    fn complete(graph: &ProjectedGraph) -> Self {
        Self {
            status: "complete",
            projected_graph_name: graph.name.clone(),
            ranks: None,
            components: None,
            nodes: None,
            modularity: None,
        }
    }
}

fn group_nodes(graph: &ProjectedGraph, labels: &[usize]) -> Vec<NodeGroup> {
    let count = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut groups: Vec<NodeGroup> = (0..count)
        .map(|component_id| NodeGroup {
            component_id,
            nodes: Vec::new(),
        })
        .collect();
    for (node, &label) in graph.nodes().zip(labels) {
        groups[label].nodes.push(node.clone());
    }
    groups
}

pub fn pagerank(
    conn: &Connection,
    scope: &BranchScope,
    request: &ProjectionRequest,
    config: PageRankConfig,
    on_iteration: impl FnMut(usize, f64),
) -> Result<AlgorithmResult> {
    let graph = request.project(conn, scope)?;
    let scores = algorithms::pagerank(&graph.graph, config, on_iteration);
    let mut ranks: Vec<RankedNode> = graph
        .nodes()
        .cloned()
        .zip(scores)
        .map(|(node, rank)| RankedNode { node, rank })
        .collect();
    ranks.sort_by(|a, b| {
        b.rank
            .total_cmp(&a.rank)
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    tracing::info!(projection = %graph.name, nodes = ranks.len(), "pagerank complete");

    let mut result = AlgorithmResult::complete(&graph);
    result.ranks = Some(ranks);
    Ok(result)
}

pub fn louvain(
    conn: &Connection,
    scope: &BranchScope,
    request: &ProjectionRequest,
    max_levels: usize,
    on_level: impl FnMut(usize, usize, f64),
) -> Result<AlgorithmResult> {
    let graph = request.project(conn, scope)?;
    let outcome = algorithms::louvain(&graph.graph, max_levels, on_level);
    tracing::info!(
        projection = %graph.name,
        levels = outcome.levels,
        modularity = outcome.modularity,
        "louvain complete"
    );

    let mut result = AlgorithmResult::complete(&graph);
    result.components = Some(group_nodes(&graph, &outcome.communities));
    result.modularity = Some(outcome.modularity);
    Ok(result)
}

/// Core number of every node, highest first. `min_k` drops shallower nodes.
pub fn k_core(
    conn: &Connection,
    scope: &BranchScope,
    request: &ProjectionRequest,
    min_k: Option<usize>,
) -> Result<AlgorithmResult> {
    let graph = request.project(conn, scope)?;
    let cores = algorithms::k_core(&graph.graph);
    let mut nodes: Vec<CoreNode> = graph
        .nodes()
        .cloned()
        .zip(cores)
        .filter(|(_, core)| min_k.map_or(true, |k| *core >= k))
        .map(|(node, core_number)| CoreNode { node, core_number })
        .collect();
    nodes.sort_by(|a, b| {
        b.core_number
            .cmp(&a.core_number)
            .then_with(|| a.node.id.cmp(&b.node.id))
    });

    let mut result = AlgorithmResult::complete(&graph);
    result.nodes = Some(nodes);
    Ok(result)
}

pub fn strongly_connected_components(
    conn: &Connection,
    scope: &BranchScope,
    request: &ProjectionRequest,
) -> Result<AlgorithmResult> {
    let graph = request.project(conn, scope)?;
    let labels = algorithms::strongly_connected_components(&graph.graph);
    let mut result = AlgorithmResult::complete(&graph);
    result.components = Some(group_nodes(&graph, &labels));
    Ok(result)
}

pub fn weakly_connected_components(
    conn: &Connection,
    scope: &BranchScope,
    request: &ProjectionRequest,
) -> Result<AlgorithmResult> {
    let graph = request.project(conn, scope)?;
    let labels = algorithms::weakly_connected_components(&graph.graph);
    let mut result = AlgorithmResult::complete(&graph);
    result.components = Some(group_nodes(&graph, &labels));
    Ok(result)
}
