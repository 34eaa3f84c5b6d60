//! Schema and node introspection tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::registry::{HandlerFuture, ToolCall};
use crate::bank::introspect::parse_label;

const DEFAULT_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LabelParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Node label, e.g. 'Component' or 'Decision'")]
    pub label: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListNodesParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Node label, e.g. 'Component' or 'Decision'")]
    pub label: String,

    #[schemars(description = "Maximum number of nodes (default: 100)")]
    pub limit: Option<u32>,

    #[schemars(description = "Number of nodes to skip (default: 0)")]
    pub offset: Option<u32>,
}

pub fn count_nodes_by_label(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: LabelParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let kind = parse_label("label", &params.label)?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, label = kind.label(), "count_nodes_by_label called");

        let count = call.run(move |bank| bank.count_nodes_by_label(&scope, kind)).await?;
        Ok(json!({ "label": kind.label(), "count": count }))
    })
}

pub fn list_nodes_by_label(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ListNodesParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let kind = parse_label("label", &params.label)?;
        let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT) as usize;
        let offset = params.offset.unwrap_or(0) as usize;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            label = kind.label(),
            limit,
            offset,
            "list_nodes_by_label called"
        );

        let page = call
            .run(move |bank| bank.list_nodes_by_label(&scope, kind, limit, offset))
            .await?;
        Ok(serde_json::to_value(page)?)
    })
}

pub fn get_node_properties(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: LabelParams = call.params()?;
        // Properties describe the shared schema; the scope is only validated.
        call.scope(&params.repository, params.branch.as_deref())?;
        let kind = parse_label("label", &params.label)?;
        tracing::info!(label = kind.label(), "get_node_properties called");

        let properties = call.run(move |bank| bank.node_properties(kind)).await?;
        Ok(json!({ "label": kind.label(), "properties": properties }))
    })
}

pub fn list_all_indexes(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: super::memory_bank::ScopeParams = call.params()?;
        call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!("list_all_indexes called");

        let indexes = call.run(|bank| bank.list_indexes()).await?;
        Ok(json!({ "count": indexes.len(), "indexes": indexes }))
    })
}
