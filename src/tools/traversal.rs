//! Graph traversal tools. Each reports an `in_progress` frame before it
//! touches the engine so streaming clients see the call was accepted.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::registry::{HandlerFuture, ToolCall};
use crate::bank::graph::{check_depth, PathEnd};
use crate::bank::types::EntityKind;
use crate::db::projection::{Direction, EdgeTable};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DependenciesParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Component whose dependencies to walk")]
    pub component_id: String,

    #[schemars(description = "Maximum number of DEPENDS_ON hops (default: 1)")]
    pub depth: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ComponentParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Component id")]
    pub component_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ShortestPathParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Id of the start node")]
    pub start_node_id: String,

    #[schemars(description = "Node kind of the start node, required when its id is shared by several kinds")]
    pub start_node_type: Option<EntityKind>,

    #[schemars(description = "Id of the end node")]
    pub end_node_id: String,

    #[schemars(description = "Node kind of the end node, required when its id is shared by several kinds")]
    pub end_node_type: Option<EntityKind>,

    #[schemars(description = "Edge types to follow (default: DEPENDS_ON)")]
    pub relationship_types: Option<Vec<EdgeTable>>,

    #[schemars(description = "Edge direction to follow (default: outgoing)")]
    pub direction: Option<Direction>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RelatedItemsParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Component at the center of the neighborhood")]
    pub component_id: String,

    #[schemars(description = "Maximum number of hops (default: 1)")]
    pub depth: Option<i64>,

    #[schemars(description = "Edge types to follow (default: all)")]
    pub relationship_types: Option<Vec<EdgeTable>>,

    #[schemars(description = "Edge direction to follow (default: both)")]
    pub direction: Option<Direction>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ContextualHistoryParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Id of the decision or component")]
    pub item_id: String,

    #[schemars(description = "Kind of the item: 'decision' or 'component'")]
    pub item_type: EntityKind,
}

pub fn get_component_dependencies(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: DependenciesParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let depth = check_depth(params.depth)?;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            component = %params.component_id,
            depth,
            "get_component_dependencies called"
        );

        call.progress.progress(json!({
            "message": "traversing DEPENDS_ON edges",
            "componentId": params.component_id,
            "depth": depth,
        }));
        let component_id = params.component_id;
        let start = component_id.clone();
        let dependencies = call
            .run(move |bank| bank.dependencies(&scope, &start, depth))
            .await?;
        Ok(json!({
            "componentId": component_id,
            "depth": depth,
            "count": dependencies.len(),
            "dependencies": dependencies,
        }))
    })
}

pub fn get_component_dependents(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ComponentParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            component = %params.component_id,
            "get_component_dependents called"
        );

        call.progress.progress(json!({
            "message": "collecting components that depend on this one",
            "componentId": params.component_id,
        }));
        let component_id = params.component_id;
        let target = component_id.clone();
        let dependents = call.run(move |bank| bank.dependents(&scope, &target)).await?;
        Ok(json!({
            "componentId": component_id,
            "count": dependents.len(),
            "dependents": dependents,
        }))
    })
}

pub fn shortest_path(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ShortestPathParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let types = params.relationship_types.unwrap_or_default();
        let direction = params.direction.unwrap_or_default();
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            start = %params.start_node_id,
            end = %params.end_node_id,
            ?direction,
            "shortest_path called"
        );

        call.progress.progress(json!({
            "message": "searching for path",
            "startNodeId": params.start_node_id,
            "endNodeId": params.end_node_id,
        }));
        let start = PathEnd::new(params.start_node_id, params.start_node_type);
        let end = PathEnd::new(params.end_node_id, params.end_node_type);
        let result = call
            .run(move |bank| bank.shortest_path(&scope, start, end, &types, direction))
            .await?;
        Ok(serde_json::to_value(result)?)
    })
}

pub fn get_related_items(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: RelatedItemsParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let depth = check_depth(params.depth)?;
        let types = params.relationship_types.unwrap_or_default();
        let direction = params.direction.unwrap_or(Direction::Both);
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            component = %params.component_id,
            depth,
            "get_related_items called"
        );

        call.progress.progress(json!({
            "message": "expanding neighborhood",
            "componentId": params.component_id,
            "depth": depth,
        }));
        let component_id = params.component_id;
        let start = component_id.clone();
        let items = call
            .run(move |bank| bank.related_items(&scope, &start, depth, &types, direction))
            .await?;
        Ok(json!({
            "componentId": component_id,
            "depth": depth,
            "count": items.len(),
            "relatedItems": items,
        }))
    })
}

pub fn get_governing_items_for_component(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ComponentParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            component = %params.component_id,
            "get_governing_items_for_component called"
        );

        let component_id = params.component_id;
        let target = component_id.clone();
        let governing = call.run(move |bank| bank.governing_items(&scope, &target)).await?;
        Ok(json!({
            "componentId": component_id,
            "decisions": governing.decisions,
            "rules": governing.rules,
        }))
    })
}

pub fn get_item_contextual_history(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ContextualHistoryParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            item = %params.item_id,
            kind = %params.item_type,
            "get_item_contextual_history called"
        );

        let (item_id, kind) = (params.item_id, params.item_type);
        let lookup = item_id.clone();
        let contexts = call
            .run(move |bank| bank.contextual_history(&scope, &lookup, kind))
            .await?;
        Ok(json!({
            "itemId": item_id,
            "itemType": kind,
            "count": contexts.len(),
            "contexts": contexts,
        }))
    })
}
