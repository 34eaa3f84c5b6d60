//! [`MemoryService`]: the orchestrator composing repositories and the graph
//! manager into atomic domain operations.
//!
//! Every multi-step mutation runs in one SQLite transaction: references are
//! checked first and a failure drops the transaction, so readers never see a
//! partial edge set. Methods are synchronous; async callers run them under
//! `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use super::delete::{self, DeleteOutcome, DeleteRequest};
use super::graph::{
    self, AlgorithmResult, GoverningItems, PathEnd, PathResult, ProjectionRequest, RelatedItem,
};
use super::introspect::{self, BankStats, IndexInfo, NodePage, PropertyInfo};
use super::transfer::{self, BankSnapshot, ImportReport};
use super::types::{
    BranchScope, Component, ComponentInput, Context, ContextUpdate, Decision, DecisionInput,
    EntityKind, File, FileInput, ItemRef, Metadata, MetadataUpdate, Rule, RuleInput, Tag,
    TagInput,
};
use super::{component, context, decision, exists, file, metadata, missing_ids, rule, tag};
use crate::db::algorithms::PageRankConfig;
use crate::db::projection::{Direction, EdgeTable};
use crate::error::{BankError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct InitOutcome {
    /// `false` when the bank already existed.
    pub created: bool,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagOutcome {
    pub tag_id: String,
    pub item: ItemRef,
    /// `false` when the item already carried the tag.
    pub attached: bool,
}

/// Shared handle to the memory bank. Cheap to clone.
#[derive(Clone)]
pub struct MemoryService {
    db: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl MemoryService {
    pub fn new(conn: Connection, db_path: Option<PathBuf>) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            db_path,
        }
    }

    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = crate::db::open_database(path)?;
        Ok(Self::new(conn, Some(path.to_path_buf())))
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(crate::db::open_in_memory()?, None))
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .db
            .lock()
            .map_err(|e| BankError::Internal(format!("db lock poisoned: {e}")))?;
        f(&mut conn)
    }

    // -- metadata ---------------------------------------------------------

    /// Create the metadata singleton. Idempotent.
    pub fn init_bank(&self, scope: &BranchScope) -> Result<InitOutcome> {
        self.with_conn(|conn| {
            if let Some(existing) = metadata::get(conn, scope)? {
                return Ok(InitOutcome {
                    created: false,
                    metadata: existing,
                });
            }
            let meta = metadata::default_for(scope, today());
            metadata::save(conn, scope, &meta)?;
            tracing::info!(scope = %scope, "memory bank initialized");
            Ok(InitOutcome {
                created: true,
                metadata: meta,
            })
        })
    }

    pub fn get_metadata(&self, scope: &BranchScope) -> Result<Metadata> {
        self.with_conn(|conn| {
            metadata::get(conn, scope)?.ok_or_else(|| BankError::not_found("metadata", scope.to_string()))
        })
    }

    /// Merge `update` into the metadata, initializing the bank if needed.
    pub fn update_metadata(&self, scope: &BranchScope, update: &MetadataUpdate) -> Result<Metadata> {
        self.with_conn(|conn| {
            let mut meta = match metadata::get(conn, scope)? {
                Some(m) => m,
                None => metadata::default_for(scope, today()),
            };
            metadata::merge(&mut meta, update);
            metadata::save(conn, scope, &meta)?;
            Ok(meta)
        })
    }

    // -- context ----------------------------------------------------------

    pub fn get_context(&self, scope: &BranchScope, latest: usize) -> Result<Vec<Context>> {
        self.with_conn(|conn| context::latest(conn, scope, latest))
    }

    /// Merge into today's context entry, creating it on the first update of the day.
    pub fn update_context(&self, scope: &BranchScope, update: &ContextUpdate) -> Result<Context> {
        self.update_context_on(scope, today(), update)
    }

    pub fn update_context_on(
        &self,
        scope: &BranchScope,
        date: NaiveDate,
        update: &ContextUpdate,
    ) -> Result<Context> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut ctx = match context::get(&tx, scope, &context::context_id(date))? {
                Some(c) => c,
                None => context::new_for(date),
            };
            context::merge(&mut ctx, update);
            context::save(&tx, scope, &ctx)?;
            tx.commit()?;
            Ok(ctx)
        })
    }

    // -- entity writes ----------------------------------------------------

    pub fn upsert_component(&self, scope: &BranchScope, input: &ComponentInput) -> Result<Component> {
        self.with_conn(|conn| apply_component(conn, scope, input))
    }

    pub fn upsert_decision(&self, scope: &BranchScope, input: &DecisionInput) -> Result<Decision> {
        self.with_conn(|conn| apply_decision(conn, scope, input))
    }

    pub fn upsert_rule(&self, scope: &BranchScope, input: &RuleInput) -> Result<Rule> {
        self.with_conn(|conn| apply_rule(conn, scope, input))
    }

    pub fn upsert_tag(&self, scope: &BranchScope, input: &TagInput) -> Result<Tag> {
        self.with_conn(|conn| apply_tag(conn, scope, input))
    }

    pub fn upsert_file(&self, scope: &BranchScope, input: &FileInput) -> Result<File> {
        self.with_conn(|conn| apply_file(conn, scope, input))
    }

    pub fn tag_item(&self, scope: &BranchScope, item: &ItemRef, tag_id: &str) -> Result<TagOutcome> {
        self.with_conn(|conn| apply_tag_item(conn, scope, item, tag_id))
    }

    pub fn items_by_tag(&self, scope: &BranchScope, tag_id: &str) -> Result<Vec<ItemRef>> {
        self.with_conn(|conn| {
            if !exists(conn, scope, EntityKind::Tag, tag_id)? {
                return Err(BankError::not_found("tag", tag_id));
            }
            tag::items_with_tag(conn, scope, tag_id)
        })
    }

    pub fn associate_file(&self, scope: &BranchScope, file_id: &str, component_id: &str) -> Result<File> {
        self.with_conn(|conn| apply_association(conn, scope, file_id, component_id))
    }

    pub fn files_for_component(&self, scope: &BranchScope, component_id: &str) -> Result<Vec<File>> {
        self.with_conn(|conn| {
            if !exists(conn, scope, EntityKind::Component, component_id)? {
                return Err(BankError::not_found("component", component_id));
            }
            file::files_for_component(conn, scope, component_id)
        })
    }

    // -- entity reads -----------------------------------------------------

    /// One record of any kind, as JSON.
    pub fn get_entity(&self, scope: &BranchScope, kind: EntityKind, id: &str) -> Result<Value> {
        self.with_conn(|conn| {
            let value = match kind {
                EntityKind::Component => component::get(conn, scope, id)?.map(serde_json::to_value),
                EntityKind::Decision => decision::get(conn, scope, id)?.map(serde_json::to_value),
                EntityKind::Rule => rule::get(conn, scope, id)?.map(serde_json::to_value),
                EntityKind::Context => context::get(conn, scope, id)?.map(serde_json::to_value),
                EntityKind::Tag => tag::get(conn, scope, id)?.map(serde_json::to_value),
                EntityKind::File => file::get(conn, scope, id)?.map(serde_json::to_value),
            };
            match value {
                Some(v) => Ok(v?),
                None => Err(BankError::not_found(kind.as_str(), id)),
            }
        })
    }

    pub fn list_entities(
        &self,
        scope: &BranchScope,
        kind: EntityKind,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Value>> {
        self.with_conn(|conn| {
            let values = match kind {
                EntityKind::Component => to_values(component::list(conn, scope, limit, offset)?)?,
                EntityKind::Decision => to_values(decision::list(conn, scope, limit, offset)?)?,
                EntityKind::Rule => to_values(rule::list(conn, scope, limit, offset)?)?,
                EntityKind::Context => to_values(context::list(conn, scope, limit, offset)?)?,
                EntityKind::Tag => to_values(tag::list(conn, scope, limit, offset)?)?,
                EntityKind::File => to_values(file::list(conn, scope, limit, offset)?)?,
            };
            Ok(values)
        })
    }

    // -- traversals -------------------------------------------------------

    pub fn dependencies(&self, scope: &BranchScope, component_id: &str, depth: usize) -> Result<Vec<Component>> {
        self.with_conn(|conn| graph::dependencies(conn, scope, component_id, depth))
    }

    pub fn dependents(&self, scope: &BranchScope, component_id: &str) -> Result<Vec<Component>> {
        self.with_conn(|conn| graph::dependents(conn, scope, component_id))
    }

    pub fn shortest_path(
        &self,
        scope: &BranchScope,
        start: impl Into<PathEnd>,
        end: impl Into<PathEnd>,
        relationship_types: &[EdgeTable],
        direction: Direction,
    ) -> Result<PathResult> {
        let (start, end) = (start.into(), end.into());
        self.with_conn(|conn| graph::shortest_path(conn, scope, &start, &end, relationship_types, direction))
    }

    pub fn related_items(
        &self,
        scope: &BranchScope,
        component_id: &str,
        depth: usize,
        relationship_types: &[EdgeTable],
        direction: Direction,
    ) -> Result<Vec<RelatedItem>> {
        self.with_conn(|conn| {
            graph::related_items(conn, scope, component_id, depth, relationship_types, direction)
        })
    }

    pub fn governing_items(&self, scope: &BranchScope, component_id: &str) -> Result<GoverningItems> {
        self.with_conn(|conn| graph::governing_items(conn, scope, component_id))
    }

    pub fn contextual_history(
        &self,
        scope: &BranchScope,
        item_id: &str,
        item_kind: EntityKind,
    ) -> Result<Vec<Context>> {
        self.with_conn(|conn| graph::contextual_history(conn, scope, item_id, item_kind))
    }

    // -- algorithms -------------------------------------------------------

    pub fn pagerank(
        &self,
        scope: &BranchScope,
        request: &ProjectionRequest,
        config: PageRankConfig,
        on_iteration: impl FnMut(usize, f64),
    ) -> Result<AlgorithmResult> {
        self.with_conn(|conn| graph::pagerank(conn, scope, request, config, on_iteration))
    }

    pub fn louvain(
        &self,
        scope: &BranchScope,
        request: &ProjectionRequest,
        max_levels: usize,
        on_level: impl FnMut(usize, usize, f64),
    ) -> Result<AlgorithmResult> {
        self.with_conn(|conn| graph::louvain(conn, scope, request, max_levels, on_level))
    }

    pub fn k_core(
        &self,
        scope: &BranchScope,
        request: &ProjectionRequest,
        min_k: Option<usize>,
    ) -> Result<AlgorithmResult> {
        self.with_conn(|conn| graph::k_core(conn, scope, request, min_k))
    }

    pub fn strongly_connected_components(
        &self,
        scope: &BranchScope,
        request: &ProjectionRequest,
    ) -> Result<AlgorithmResult> {
        self.with_conn(|conn| graph::strongly_connected_components(conn, scope, request))
    }

    pub fn weakly_connected_components(
        &self,
        scope: &BranchScope,
        request: &ProjectionRequest,
    ) -> Result<AlgorithmResult> {
        self.with_conn(|conn| graph::weakly_connected_components(conn, scope, request))
    }

    // -- deletion, transfer, introspection --------------------------------

    pub fn delete(&self, scope: &BranchScope, request: &DeleteRequest) -> Result<DeleteOutcome> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let outcome = delete::execute(&tx, scope, request)?;
            tx.commit()?;
            Ok(outcome)
        })
    }

    pub fn export(&self, scope: &BranchScope) -> Result<BankSnapshot> {
        self.with_conn(|conn| transfer::export(conn, scope))
    }

    pub fn import(&self, scope: &BranchScope, snapshot: &BankSnapshot) -> Result<ImportReport> {
        self.with_conn(|conn| Ok(transfer::import(conn, scope, snapshot)))
    }

    pub fn stats(&self, scope: &BranchScope) -> Result<BankStats> {
        let path = self.db_path.clone();
        self.with_conn(|conn| introspect::stats(conn, scope, path.as_deref()))
    }

    pub fn count_nodes_by_label(&self, scope: &BranchScope, kind: EntityKind) -> Result<u64> {
        self.with_conn(|conn| super::count(conn, scope, kind))
    }

    pub fn list_nodes_by_label(
        &self,
        scope: &BranchScope,
        kind: EntityKind,
        limit: usize,
        offset: usize,
    ) -> Result<NodePage> {
        self.with_conn(|conn| introspect::list_nodes_by_label(conn, scope, kind, limit, offset))
    }

    pub fn node_properties(&self, kind: EntityKind) -> Result<Vec<PropertyInfo>> {
        self.with_conn(|conn| introspect::node_properties(conn, kind))
    }

    pub fn list_indexes(&self) -> Result<Vec<IndexInfo>> {
        self.with_conn(|conn| introspect::list_indexes(conn))
    }
}

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

fn to_values<T: Serialize>(records: Vec<T>) -> Result<Vec<Value>> {
    records
        .iter()
        .map(|r| serde_json::to_value(r).map_err(BankError::from))
        .collect()
}

fn first_missing(
    conn: &Connection,
    scope: &BranchScope,
    kind: EntityKind,
    ids: &[String],
) -> Result<()> {
    match missing_ids(conn, scope, kind, ids)?.into_iter().next() {
        Some(id) => Err(BankError::invalid_reference(kind.as_str(), id)),
        None => Ok(()),
    }
}

fn reread<T>(found: Option<T>, kind: &'static str, id: &str) -> Result<T> {
    found.ok_or_else(|| BankError::Internal(format!("{kind} {id} vanished after write")))
}

// Checked writes shared by the service and import. Each validates, checks
// references, writes, and commits in its own transaction.

pub(crate) fn apply_component(
    conn: &mut Connection,
    scope: &BranchScope,
    input: &ComponentInput,
) -> Result<Component> {
    input.validate()?;
    let tx = conn.transaction()?;
    first_missing(&tx, scope, EntityKind::Component, &input.depends_on)?;
    component::upsert(&tx, scope, input)?;
    let stored = reread(component::get(&tx, scope, &input.id)?, "component", &input.id)?;
    tx.commit()?;
    tracing::info!(scope = %scope, id = %stored.id, deps = stored.depends_on.len(), "component upserted");
    Ok(stored)
}

pub(crate) fn apply_decision(
    conn: &mut Connection,
    scope: &BranchScope,
    input: &DecisionInput,
) -> Result<Decision> {
    input.validate()?;
    let tx = conn.transaction()?;
    first_missing(&tx, scope, EntityKind::Component, &input.governs)?;
    decision::upsert(&tx, scope, input)?;
    let stored = reread(decision::get(&tx, scope, &input.id)?, "decision", &input.id)?;
    tx.commit()?;
    tracing::info!(scope = %scope, id = %stored.id, "decision upserted");
    Ok(stored)
}

pub(crate) fn apply_rule(conn: &mut Connection, scope: &BranchScope, input: &RuleInput) -> Result<Rule> {
    input.validate()?;
    let tx = conn.transaction()?;
    first_missing(&tx, scope, EntityKind::Component, &input.governs)?;
    rule::upsert(&tx, scope, input)?;
    let stored = reread(rule::get(&tx, scope, &input.id)?, "rule", &input.id)?;
    tx.commit()?;
    tracing::info!(scope = %scope, id = %stored.id, "rule upserted");
    Ok(stored)
}

pub(crate) fn apply_tag(conn: &mut Connection, scope: &BranchScope, input: &TagInput) -> Result<Tag> {
    input.validate()?;
    let tx = conn.transaction()?;
    tag::upsert(&tx, scope, input)?;
    let stored = reread(tag::get(&tx, scope, &input.id)?, "tag", &input.id)?;
    tx.commit()?;
    Ok(stored)
}

pub(crate) fn apply_file(conn: &mut Connection, scope: &BranchScope, input: &FileInput) -> Result<File> {
    input.validate()?;
    let tx = conn.transaction()?;
    file::upsert(&tx, scope, input)?;
    let stored = reread(file::get(&tx, scope, &input.id)?, "file", &input.id)?;
    tx.commit()?;
    Ok(stored)
}

pub(crate) fn apply_tag_item(
    conn: &mut Connection,
    scope: &BranchScope,
    item: &ItemRef,
    tag_id: &str,
) -> Result<TagOutcome> {
    if item.kind == EntityKind::Tag {
        return Err(BankError::validation("item_type", "tags cannot be tagged"));
    }
    let tx = conn.transaction()?;
    if !exists(&tx, scope, EntityKind::Tag, tag_id)? {
        return Err(BankError::not_found("tag", tag_id));
    }
    if !exists(&tx, scope, item.kind, &item.id)? {
        return Err(BankError::not_found(item.kind.as_str(), item.id.clone()));
    }
    let attached = tag::attach(&tx, scope, item, tag_id)?;
    tx.commit()?;
    Ok(TagOutcome {
        tag_id: tag_id.to_string(),
        item: item.clone(),
        attached,
    })
}

pub(crate) fn apply_association(
    conn: &mut Connection,
    scope: &BranchScope,
    file_id: &str,
    component_id: &str,
) -> Result<File> {
    let tx = conn.transaction()?;
    if !exists(&tx, scope, EntityKind::File, file_id)? {
        return Err(BankError::not_found("file", file_id));
    }
    if !exists(&tx, scope, EntityKind::Component, component_id)? {
        return Err(BankError::not_found("component", component_id));
    }
    file::associate(&tx, scope, file_id, component_id)?;
    let stored = reread(file::get(&tx, scope, file_id)?, "file", file_id)?;
    tx.commit()?;
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::types::ComponentStatus;

    fn component(id: &str, deps: &[&str]) -> ComponentInput {
        ComponentInput {
            id: id.into(),
            name: id.into(),
            kind: "service".into(),
            status: ComponentStatus::Active,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn init_is_idempotent() {
        let bank = MemoryService::open_in_memory().unwrap();
        let scope = BranchScope::new("acme", "main").unwrap();
        assert!(bank.init_bank(&scope).unwrap().created);
        assert!(!bank.init_bank(&scope).unwrap().created);
        assert_eq!(bank.get_metadata(&scope).unwrap().name, "acme");
    }

    #[test]
    fn dangling_dependency_writes_nothing() {
        let bank = MemoryService::open_in_memory().unwrap();
        let scope = BranchScope::new("acme", "main").unwrap();
        bank.upsert_component(&scope, &component("a", &[])).unwrap();
        let err = bank
            .upsert_component(&scope, &component("b", &["a", "ghost"]))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_reference");
        assert!(bank.get_entity(&scope, EntityKind::Component, "b").is_err());
        assert!(bank.dependents(&scope, "a").unwrap().is_empty());
    }

    #[test]
    fn context_merges_same_day() {
        let bank = MemoryService::open_in_memory().unwrap();
        let scope = BranchScope::new("acme", "main").unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        bank.update_context_on(
            &scope,
            day,
            &ContextUpdate {
                summary: Some("first".into()),
                decisions: vec!["dec-1".into()],
                ..Default::default()
            },
        )
        .unwrap();
        let ctx = bank
            .update_context_on(
                &scope,
                day,
                &ContextUpdate {
                    summary: Some("second".into()),
                    decisions: vec!["dec-1".into(), "dec-2".into()],
                    observations: vec!["note".into()],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ctx.id, "ctx-2026-10-15");
        assert_eq!(ctx.summary, "second");
        assert_eq!(ctx.decisions, vec!["dec-1", "dec-2"]);
        assert_eq!(bank.get_context(&scope, 10).unwrap().len(), 1);
    }

    #[test]
    fn tagging_requires_existing_tag() {
        let bank = MemoryService::open_in_memory().unwrap();
        let scope = BranchScope::new("acme", "main").unwrap();
        bank.upsert_component(&scope, &component("a", &[])).unwrap();
        let err = bank
            .tag_item(&scope, &ItemRef::new(EntityKind::Component, "a"), "missing")
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
