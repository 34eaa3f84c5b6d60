//! Single and bulk delete tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::registry::{HandlerFuture, ToolCall};
use crate::bank::delete::{DeleteRequest, DeleteTarget};
use crate::bank::types::EntityKind;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteEntityParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Kind of the entity to delete")]
    pub entity_type: EntityKind,

    #[schemars(description = "Entity id")]
    pub id: String,

    #[schemars(description = "Report what would be deleted without deleting (default: false)")]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BulkDeleteByTagParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Delete every item carrying this tag")]
    pub tag_id: String,

    #[schemars(description = "Report what would be deleted without deleting (default: false)")]
    pub dry_run: Option<bool>,

    #[schemars(description = "Must be true to actually delete (default: false)")]
    pub confirm: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BulkDeleteByTypeParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Delete every entity of this kind in the branch")]
    pub entity_type: EntityKind,

    #[schemars(description = "Report what would be deleted without deleting (default: false)")]
    pub dry_run: Option<bool>,

    #[schemars(description = "Must be true to actually delete (default: false)")]
    pub confirm: Option<bool>,
}

pub fn delete_entity(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: DeleteEntityParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let dry_run = params.dry_run.unwrap_or(false);
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            kind = %params.entity_type,
            id = %params.id,
            dry_run,
            "delete_entity called"
        );

        let request = DeleteRequest {
            target: DeleteTarget::Single {
                kind: params.entity_type,
                id: params.id,
            },
            dry_run,
            confirm: true,
        };
        let outcome = call.run(move |bank| bank.delete(&scope, &request)).await?;
        Ok(serde_json::to_value(outcome)?)
    })
}

pub fn bulk_delete_by_tag(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: BulkDeleteByTagParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let dry_run = params.dry_run.unwrap_or(false);
        let confirm = params.confirm.unwrap_or(false);
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            tag = %params.tag_id,
            dry_run,
            confirm,
            "bulk_delete_by_tag called"
        );

        let request = DeleteRequest {
            target: DeleteTarget::ByTag {
                tag_id: params.tag_id,
            },
            dry_run,
            confirm,
        };
        let outcome = call.run(move |bank| bank.delete(&scope, &request)).await?;
        Ok(serde_json::to_value(outcome)?)
    })
}

pub fn bulk_delete_by_type(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: BulkDeleteByTypeParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let dry_run = params.dry_run.unwrap_or(false);
        let confirm = params.confirm.unwrap_or(false);
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            kind = %params.entity_type,
            dry_run,
            confirm,
            "bulk_delete_by_type called"
        );

        let request = DeleteRequest {
            target: DeleteTarget::ByType {
                kind: params.entity_type,
            },
            dry_run,
            confirm,
        };
        let outcome = call.run(move |bank| bank.delete(&scope, &request)).await?;
        Ok(serde_json::to_value(outcome)?)
    })
}
