//! Tool execution service: resolves a tool name, validates arguments, runs
//! the handler in its own task, and drives the invocation's progress
//! channel to exactly one terminal frame.

pub mod algorithms;
pub mod delete;
pub mod entities;
pub mod introspect;
pub mod memory_bank;
pub mod progress;
pub mod registry;
pub mod transfer;
pub mod traversal;

use std::sync::Arc;

use serde_json::{json, Value};

use crate::bank::MemoryService;
use crate::error::{BankError, Result};
use crate::session::{self, CloseReason, CloseSignal, SessionManager};
use progress::{Invocation, ProgressEmitter};
use registry::{ToolCall, ToolRegistry};

pub(crate) fn register_builtin(registry: &mut ToolRegistry) {
    use algorithms::*;
    use delete::*;
    use entities::*;
    use introspect::*;
    use memory_bank::*;
    use transfer::*;
    use traversal::*;

    registry.register::<ScopeParams>(
        "init_memory_bank",
        "Initialize the memory bank for a repository branch. Idempotent.",
        init_memory_bank,
    );
    registry.register::<ScopeParams>(
        "get_metadata",
        "Get the project metadata of a repository branch.",
        get_metadata,
    );
    registry.register::<UpdateMetadataParams>(
        "update_metadata",
        "Update project metadata. Unset fields are left unchanged; tech stack entries are merged.",
        update_metadata,
    );
    registry.register::<GetContextParams>(
        "get_context",
        "Get the latest daily context entries, newest first.",
        get_context,
    );
    registry.register::<UpdateContextParams>(
        "update_context",
        "Update today's context: summary and agent overwrite, decisions and observations append.",
        update_context,
    );
    registry.register::<ScopeParams>(
        "memory_bank_stats",
        "Node and edge counts per label for a repository branch.",
        memory_bank_stats,
    );

    registry.register::<AddComponentParams>(
        "add_component",
        "Create or update a component. depends_on replaces its DEPENDS_ON edges; every target must exist.",
        add_component,
    );
    registry.register::<AddDecisionParams>(
        "add_decision",
        "Create or update a decision. governs replaces its GOVERNS edges; every target must exist.",
        add_decision,
    );
    registry.register::<AddRuleParams>(
        "add_rule",
        "Create or update a rule. governs replaces its GOVERNS edges; every target must exist.",
        add_rule,
    );
    registry.register::<AddTagParams>("add_tag", "Create or update a tag.", add_tag);
    registry.register::<TagItemParams>(
        "tag_item",
        "Attach an existing tag to a component, decision, rule, context, or file.",
        tag_item,
    );
    registry.register::<TagIdParams>(
        "find_items_by_tag",
        "List every item carrying a tag.",
        find_items_by_tag,
    );
    registry.register::<AddFileParams>("add_file", "Create or update a file record.", add_file);
    registry.register::<AssociateFileParams>(
        "associate_file_with_component",
        "Record that a file belongs to a component.",
        associate_file_with_component,
    );
    registry.register::<ComponentFilesParams>(
        "get_component_files",
        "List the files that belong to a component.",
        get_component_files,
    );
    registry.register::<GetEntityParams>(
        "get_entity",
        "Fetch one entity by kind and id.",
        get_entity,
    );
    registry.register::<ListEntitiesParams>(
        "list_entities",
        "List entities of one kind, ordered by id.",
        list_entities,
    );

    registry.register::<DependenciesParams>(
        "get_component_dependencies",
        "Components reachable over DEPENDS_ON edges within depth hops, nearest first.",
        get_component_dependencies,
    );
    registry.register::<ComponentParams>(
        "get_component_dependents",
        "Components that depend directly on a component.",
        get_component_dependents,
    );
    registry.register::<ShortestPathParams>(
        "shortest_path",
        "Shortest path between two nodes over the chosen relationship types.",
        shortest_path,
    );
    registry.register::<RelatedItemsParams>(
        "get_related_items",
        "Every node within depth hops of a component.",
        get_related_items,
    );
    registry.register::<ComponentParams>(
        "get_governing_items_for_component",
        "Decisions and rules that govern a component.",
        get_governing_items_for_component,
    );
    registry.register::<ContextualHistoryParams>(
        "get_item_contextual_history",
        "Context entries that reference a decision, or any decision governing a component.",
        get_item_contextual_history,
    );

    registry.register::<PageRankParams>(
        "pagerank",
        "PageRank over a projected subgraph. Streams one progress frame per iteration.",
        pagerank,
    );
    registry.register::<LouvainParams>(
        "louvain_community_detection",
        "Louvain community detection over a projected subgraph. Streams one progress frame per level.",
        louvain_community_detection,
    );
    registry.register::<KCoreParams>(
        "k_core_decomposition",
        "Core number of every node in a projected subgraph.",
        k_core_decomposition,
    );
    registry.register::<ComponentsParams>(
        "strongly_connected_components",
        "Strongly connected components of a projected subgraph.",
        strongly_connected_components,
    );
    registry.register::<ComponentsParams>(
        "weakly_connected_components",
        "Weakly connected components of a projected subgraph.",
        weakly_connected_components,
    );

    registry.register::<LabelParams>(
        "count_nodes_by_label",
        "Number of nodes with a label in a repository branch.",
        count_nodes_by_label,
    );
    registry.register::<ListNodesParams>(
        "list_nodes_by_label",
        "Page through the nodes with a label in a repository branch.",
        list_nodes_by_label,
    );
    registry.register::<LabelParams>(
        "get_node_properties",
        "Property names and types of a node label.",
        get_node_properties,
    );
    registry.register::<ScopeParams>(
        "list_all_indexes",
        "Every index in the store.",
        list_all_indexes,
    );

    registry.register::<ScopeParams>(
        "export_memory_bank",
        "Export every entity and edge of a repository branch as a JSON snapshot.",
        export_memory_bank,
    );
    registry.register::<ImportParams>(
        "import_memory_bank",
        "Import a JSON snapshot into a repository branch. Records are applied individually.",
        import_memory_bank,
    );

    registry.register::<DeleteEntityParams>(
        "delete_entity",
        "Delete one entity and its edges. Supports dry_run.",
        delete_entity,
    );
    registry.register::<BulkDeleteByTagParams>(
        "bulk_delete_by_tag",
        "Delete every item carrying a tag. Requires confirm=true unless dry_run.",
        bulk_delete_by_tag,
    );
    registry.register::<BulkDeleteByTypeParams>(
        "bulk_delete_by_type",
        "Delete every entity of one kind in a branch. Requires confirm=true unless dry_run.",
        bulk_delete_by_type,
    );
}

/// Uniform entry point from every transport into the tool handlers.
#[derive(Clone)]
pub struct ToolService {
    registry: Arc<ToolRegistry>,
    bank: MemoryService,
    sessions: Arc<SessionManager>,
    default_branch: String,
}

impl ToolService {
    pub fn new(bank: MemoryService, sessions: Arc<SessionManager>, default_branch: impl Into<String>) -> Self {
        Self::with_registry(Arc::new(ToolRegistry::builtin()), bank, sessions, default_branch)
    }

    pub fn with_registry(
        registry: Arc<ToolRegistry>,
        bank: MemoryService,
        sessions: Arc<SessionManager>,
        default_branch: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            bank,
            sessions,
            default_branch: default_branch.into(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn bank(&self) -> &MemoryService {
        &self.bank
    }

    /// `tools/list` entries, sorted by name.
    pub fn list_tools(&self) -> Vec<Value> {
        self.registry.iter().map(|t| t.listing()).collect()
    }

    /// Start `name` on behalf of `session_id`.
    ///
    /// Fails only when the session is not live. Every other failure,
    /// including an unknown tool, arrives as the invocation's error frame.
    pub async fn invoke(
        &self,
        session_id: &str,
        request_id: Value,
        name: &str,
        arguments: Value,
    ) -> Result<Invocation> {
        self.sessions.touch(session_id).await?;
        let close = self.sessions.subscribe_close(session_id).await?;

        let (emitter, invocation) = Invocation::channel(request_id);
        emitter.initializing(json!({ "tool": name, "arguments": arguments }));
        tracing::debug!(session = %session_id, tool = %name, "tool invocation started");

        let service = self.clone();
        let session_id = session_id.to_string();
        let name = name.to_string();
        tokio::spawn(async move {
            service.execute(session_id, name, arguments, emitter, close).await;
        });
        Ok(invocation)
    }

    async fn execute(
        self,
        session_id: String,
        name: String,
        arguments: Value,
        emitter: ProgressEmitter,
        mut close: CloseSignal,
    ) {
        let result = self.dispatch(&name, arguments, emitter.clone(), &mut close).await;
        let delivered = match &result {
            Ok(value) => emitter.complete(value.clone()),
            Err(e) => {
                tracing::warn!(tool = %name, kind = e.kind(), error = %e, "tool failed");
                emitter.error(e)
            }
        };
        if delivered {
            return;
        }
        if emitter.is_disconnected() {
            tracing::warn!(session = %session_id, tool = %name, "client went away before the result was delivered");
            self.sessions
                .close(&session_id, CloseReason::TransportError("progress receiver dropped".into()))
                .await;
        } else {
            tracing::debug!(tool = %name, "handler already responded");
        }
    }

    async fn dispatch(
        &self,
        name: &str,
        arguments: Value,
        emitter: ProgressEmitter,
        close: &mut CloseSignal,
    ) -> Result<Value> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| BankError::ToolNotFound(name.to_string()))?;
        tool.validate(&arguments)?;

        let call = ToolCall {
            bank: self.bank.clone(),
            arguments,
            progress: emitter,
            default_branch: self.default_branch.clone(),
        };
        let mut handle = tokio::spawn((tool.handler)(call));
        tokio::select! {
            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    tracing::error!(tool = %name, "tool handler panicked");
                    Err(BankError::Internal(format!("tool {name} panicked")))
                }
                Err(e) => Err(BankError::Internal(format!("tool {name} did not finish: {e}"))),
            },
            reason = session::closed(close) => {
                handle.abort();
                Err(BankError::Transport(reason.to_string()))
            }
        }
    }
}
