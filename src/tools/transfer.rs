//! Snapshot export and import tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::memory_bank::ScopeParams;
use super::registry::{HandlerFuture, ToolCall};
use crate::bank::transfer::BankSnapshot;
use crate::error::BankError;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ImportParams {
    #[schemars(description = "Repository to import into")]
    pub repository: String,

    #[schemars(description = "Branch to import into (defaults to the configured default branch)")]
    pub branch: Option<String>,

    #[schemars(description = "Snapshot object as produced by export_memory_bank")]
    pub data: Value,
}

pub fn export_memory_bank(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ScopeParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        tracing::info!(repository = %scope.repository, branch = %scope.branch, "export_memory_bank called");

        let snapshot = call.run(move |bank| bank.export(&scope)).await?;
        Ok(serde_json::to_value(snapshot)?)
    })
}

pub fn import_memory_bank(call: ToolCall) -> HandlerFuture {
    Box::pin(async move {
        let params: ImportParams = call.params()?;
        let scope = call.scope(&params.repository, params.branch.as_deref())?;
        let snapshot: BankSnapshot = serde_json::from_value(params.data)
            .map_err(|e| BankError::validation("data", e.to_string()))?;
        tracing::info!(
            repository = %scope.repository,
            branch = %scope.branch,
            source = %format!("{}:{}", snapshot.repository, snapshot.branch),
            records = snapshot.record_count(),
            "import_memory_bank called"
        );

        call.progress.progress(json!({
            "message": "importing snapshot",
            "records": snapshot.record_count(),
        }));
        let report = call.run(move |bank| bank.import(&scope, &snapshot)).await?;
        Ok(serde_json::to_value(report)?)
    })
}
