//! Graph algorithm tools over a named projected subgraph.
//!
//! Iterative algorithms report each step through the invocation's emitter:
//! PageRank per iteration, Louvain per aggregation level.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::registry::{HandlerFuture, ToolCall};
use crate::bank::graph::ProjectionRequest;
use crate::db::algorithms::PageRankConfig;
use crate::error::{BankError, FieldError};

const DEFAULT_LOUVAIN_LEVELS: u32 = 10;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PageRankParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Name for the projected subgraph")]
    pub projected_graph_name: String,

    #[schemars(description = "Node tables to project, e.g. ['Component']")]
    pub node_table_names: Vec<String>,

    #[schemars(description = "Relationship tables to project, e.g. ['DEPENDS_ON']")]
    pub relationship_table_names: Vec<String>,

    #[schemars(description = "Damping factor in (0, 1) (default: 0.85)")]
    pub damping_factor: Option<f64>,

    #[schemars(description = "Maximum iterations (default: 20)")]
    pub max_iterations: Option<u32>,

    #[schemars(description = "Convergence tolerance on the L1 delta (default: 1e-7)")]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LouvainParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Name for the projected subgraph")]
    pub projected_graph_name: String,

    #[schemars(description = "Node tables to project, e.g. ['Component']")]
    pub node_table_names: Vec<String>,

    #[schemars(description = "Relationship tables to project, e.g. ['DEPENDS_ON']")]
    pub relationship_table_names: Vec<String>,

    #[schemars(description = "Maximum aggregation levels (default: 10)")]
    pub max_levels: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct KCoreParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Name for the projected subgraph")]
    pub projected_graph_name: String,

    #[schemars(description = "Node tables to project, e.g. ['Component']")]
    pub node_table_names: Vec<String>,

    #[schemars(description = "Relationship tables to project, e.g. ['DEPENDS_ON']")]
    pub relationship_table_names: Vec<String>,

    #[schemars(description = "Only return nodes with core number >= k")]
    pub k: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ComponentsParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Name for the projected subgraph")]
    pub projected_graph_name: String,

    #[schemars(description = "Node tables to project, e.g. ['Component']")]
    pub node_table_names: Vec<String>,

    #[schemars(description = "Relationship tables to project, e.g. ['DEPENDS_ON']")]
    pub relationship_table_names: Vec<String>,
}

fn projection(name: String, node_tables: Vec<String>, edge_tables: Vec<String>) -> ProjectionRequest {
    ProjectionRequest {
        name,
        node_tables,
        edge_tables,
    }
}

fn pagerank_config(params: &PageRankParams) -> crate::error::Result<PageRankConfig> {
    let mut config = PageRankConfig::default();
    let mut fields = Vec::new();
    if let Some(d) = params.damping_factor {
        if d > 0.0 && d < 1.0 {
            config.damping = d;
        } else {
            fields.push(FieldError::new("damping_factor", "must be between 0 and 1"));
        }
    }
    if let Some(n) = params.max_iterations {
        if n == 0 {
            fields.push(FieldError::new("max_iterations", "must be at least 1"));
        } else {
            config.max_iterations = n as usize;
        }
    }
    if let Some(t) = params.tolerance {
        if t > 0.0 {
            config.tolerance = t;
        } else {
            fields.push(FieldError::new("tolerance", "must be positive"));
        }
    }
    if fields.is_empty() {
        Ok(config)
    } else {
        Err(BankError::Validation(fields))
    }
}

pub fn pagerank(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: PageRankParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let config = pagerank_config(&params)?;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            graph = %params.projected_graph_name,
            damping = config.damping,
            "pagerank called"
        );

        let request = projection(
            params.projected_graph_name,
            params.node_table_names,
            params.relationship_table_names,
        );
        let emitter = call.progress.clone();
        let result = call
            .run(move |bank| {
                bank.pagerank(&scope, &request, config, |iteration, delta| {
                    emitter.progress(json!({ "currentIteration": iteration, "delta": delta }));
                })
            })
            .await?;
        Ok(serde_json::to_value(result)?)
    })
}

pub fn louvain_community_detection(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: LouvainParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let max_levels = params.max_levels.unwrap_or(DEFAULT_LOUVAIN_LEVELS).max(1) as usize;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            graph = %params.projected_graph_name,
            max_levels,
            "louvain_community_detection called"
        );

        let request = projection(
            params.projected_graph_name,
            params.node_table_names,
            params.relationship_table_names,
        );
        let emitter = call.progress.clone();
        let result = call
            .run(move |bank| {
                bank.louvain(&scope, &request, max_levels, |level, communities, modularity| {
                    emitter.progress(json!({
                        "level": level,
                        "communities": communities,
                        "modularity": modularity,
                    }));
                })
            })
            .await?;
        Ok(serde_json::to_value(result)?)
    })
}

pub fn k_core_decomposition(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: KCoreParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let min_k = params.k.map(|k| k as usize);
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            graph = %params.projected_graph_name,
            k = ?min_k,
            "k_core_decomposition called"
        );

        let request = projection(
            params.projected_graph_name,
            params.node_table_names,
            params.relationship_table_names,
        );
        let result = call.run(move |bank| bank.k_core(&scope, &request, min_k)).await?;
        Ok(serde_json::to_value(result)?)
    })
}

pub fn strongly_connected_components(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ComponentsParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            graph = %params.projected_graph_name,
            "strongly_connected_components called"
        );

        let request = projection(
            params.projected_graph_name,
            params.node_table_names,
            params.relationship_table_names,
        );
        let result = call
            .run(move |bank| bank.strongly_connected_components(&scope, &request))
            .await?;
        Ok(serde_json::to_value(result)?)
    })
}

pub fn weakly_connected_components(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ComponentsParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            graph = %params.projected_graph_name,
            "weakly_connected_components called"
        );

        let request = projection(
            params.projected_graph_name,
            params.node_table_names,
            params.relationship_table_names,
        );
        let result = call
            .run(move |bank| bank.weakly_connected_components(&scope, &request))
            .await?;
        Ok(serde_json::to_value(result)?)
    })
}
