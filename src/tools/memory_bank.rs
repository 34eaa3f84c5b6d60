//! Bank lifecycle, metadata, and context tools.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::registry::{HandlerFuture, ToolCall};
use crate::bank::types::{ContextUpdate, MetadataUpdate};

const DEFAULT_CONTEXT_LIMIT: u32 = 10;

/// Parameters for tools that only need a branch scope.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ScopeParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateMetadataParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Display name of the memory bank")]
    pub name: Option<String>,

    #[schemars(description = "Project name")]
    pub project_name: Option<String>,

    #[schemars(description = "Tech stack entries to merge, e.g. {\"language\": \"Rust\"}")]
    pub tech_stack: Option<BTreeMap<String, String>>,

    #[schemars(description = "Architecture style, e.g. 'microservices'")]
    pub architecture: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetContextParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Number of most recent entries to return (default: 10)")]
    pub latest: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateContextParams {
    #[schemars(description = "Repository name")]
    pub repository: String,

    #[schemars(description = "Branch name (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Identifier of the agent writing the entry")]
    pub agent: Option<String>,

    #[schemars(description = "Summary of today's work; replaces the previous summary")]
    pub summary: Option<String>,

    #[schemars(description = "Decision ids to reference; appended without duplicates")]
    pub decisions: Option<Vec<String>>,

    #[schemars(description = "Observations to append")]
    pub observations: Option<Vec<String>>,
}

pub fn init_memory_bank(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ScopeParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, "init_memory_bank called");

        let outcome = call.run(move |bank| bank.init_bank(&scope)).await?;
        let message = if outcome.created {
            "memory bank initialized"
        } else {
            "memory bank already initialized"
        };
        Ok(json!({
            "created": outcome.created,
            "metadata": outcome.metadata,
            "message": message,
        }))
    })
}

pub fn get_metadata(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ScopeParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, "get_metadata called");

        let metadata = call.run(move |bank| bank.get_metadata(&scope)).await?;
        Ok(serde_json::to_value(metadata)?)
    })
}

pub fn update_metadata(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: UpdateMetadataParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, "update_metadata called");

        let update = MetadataUpdate {
            name: params.name,
            project_name: params.project_name,
            tech_stack: params.tech_stack.unwrap_or_default(),
            architecture: params.architecture,
        };
        let metadata = call.run(move |bank| bank.update_metadata(&scope, &update)).await?;
        Ok(serde_json::to_value(metadata)?)
    })
}

pub fn get_context(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: GetContextParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let latest = params.latest.unwrap_or(DEFAULT_CONTEXT_LIMIT) as usize;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, latest, "get_context called");

        let contexts = call.run(move |bank| bank.get_context(&scope, latest)).await?;
        Ok(json!({ "count": contexts.len(), "contexts": contexts }))
    })
}

pub fn update_context(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: UpdateContextParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, "update_context called");

        let update = ContextUpdate {
            agent: params.agent,
            summary: params.summary,
            decisions: params.decisions.unwrap_or_default(),
            observations: params.observations.unwrap_or_default(),
        };
        let context = call.run(move |bank| bank.update_context(&scope, &update)).await?;
        Ok(serde_json::to_value(context)?)
    })
}

pub fn memory_bank_stats(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ScopeParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, "memory_bank_stats called");

        let stats = call.run(move |bank| bank.stats(&scope)).await?;
        Ok(serde_json::to_value(stats)?)
    })
}
