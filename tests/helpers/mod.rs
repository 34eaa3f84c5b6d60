#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use memory_bank::bank::types::{
    BranchScope, ComponentInput, ComponentStatus, DecisionInput, RuleInput, RuleStatus, TagInput,
};
use memory_bank::bank::MemoryService;
use memory_bank::session::{SessionManager, Transport};
use memory_bank::tools::progress::ProgressFrame;
use memory_bank::tools::ToolService;
use serde_json::Value;

/// A fresh in-memory bank with schema and migrations applied.
pub fn test_bank() -> MemoryService {
    MemoryService::open_in_memory().unwrap()
}

pub fn scope(repository: &str, branch: &str) -> BranchScope {
    BranchScope::new(repository, branch).unwrap()
}

pub fn component(id: &str, depends_on: &[&str]) -> ComponentInput {
    ComponentInput {
        id: id.into(),
        name: format!("Component {id}"),
        kind: "service".into(),
        status: ComponentStatus::Active,
        depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
    }
}

pub fn decision(id: &str, date: &str, governs: &[&str]) -> DecisionInput {
    DecisionInput {
        id: id.into(),
        name: format!("Decision {id}"),
        context: Some("recorded in a test".into()),
        date: date.into(),
        governs: governs.iter().map(|g| g.to_string()).collect(),
    }
}

pub fn rule(id: &str, governs: &[&str]) -> RuleInput {
    RuleInput {
        id: id.into(),
        name: format!("Rule {id}"),
        created: "2026-01-01".into(),
        triggers: vec!["on-commit".into()],
        content: "always do the thing".into(),
        status: RuleStatus::Active,
        governs: governs.iter().map(|g| g.to_string()).collect(),
    }
}

pub fn tag(id: &str) -> TagInput {
    TagInput {
        id: id.into(),
        name: id.to_uppercase(),
        color: None,
        description: None,
    }
}

/// A tool service over a fresh bank plus one live session.
pub async fn tool_service(idle_timeout: Duration) -> (ToolService, String) {
    let sessions = Arc::new(SessionManager::new(idle_timeout));
    let session = sessions.create(Transport::Stdio).await;
    (ToolService::new(test_bank(), sessions, "main"), session)
}

/// Run a tool to completion and return every frame it produced.
pub async fn call(service: &ToolService, session: &str, name: &str, arguments: Value) -> Vec<ProgressFrame> {
    service
        .invoke(session, Value::from(name), name, arguments)
        .await
        .unwrap()
        .collect()
        .await
}

/// Run a tool and return its terminal payload.
pub async fn call_final(service: &ToolService, session: &str, name: &str, arguments: Value) -> Value {
    let frames = call(service, session, name, arguments).await;
    frames.last().unwrap().payload()
}
