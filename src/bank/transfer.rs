//! JSON snapshot export and per-record import.
//!
//! Import applies each record through the same checked write path as the
//! tools, one transaction per record, and reports failures individually
//! instead of aborting. Components are retried in passes so their order in
//! the file does not matter.

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::service::{
    apply_association, apply_component, apply_decision, apply_file, apply_rule, apply_tag,
    apply_tag_item,
};
use super::types::{
    check_date, BranchScope, Component, ComponentInput, Context, Decision, DecisionInput, File,
    FileInput, ItemRef, Metadata, Rule, RuleInput, Tag, TagInput,
};
use super::{component, context, decision, file, metadata, now, rule, tag};
use crate::error::{BankError, Result};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Enough rows to mean "all of them" in a paged listing.
const ALL_ROWS: usize = u32::MAX as usize;

fn default_format_version() -> u32 {
    SNAPSHOT_FORMAT_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAssignment {
    pub tag_id: String,
    pub item: ItemRef,
}

/// Every entity and edge of one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankSnapshot {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub repository: String,
    pub branch: String,
    #[serde(default)]
    pub exported_at: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contexts: Vec<Context>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub files: Vec<File>,
    #[serde(default)]
    pub tag_assignments: Vec<TagAssignment>,
}

impl BankSnapshot {
    pub fn record_count(&self) -> usize {
        usize::from(self.metadata.is_some())
            + self.contexts.len()
            + self.components.len()
            + self.decisions.len()
            + self.rules.len()
            + self.tags.len()
            + self.files.len()
            + self.tag_assignments.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    pub kind: String,
    pub id: String,
    pub error: String,
    pub error_kind: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: BTreeMap<&'static str, usize>,
    pub total_imported: usize,
    pub failed: Vec<ImportFailure>,
}

impl ImportReport {
    fn ok(&mut self, kind: &'static str) {
        *self.imported.entry(kind).or_insert(0) += 1;
        self.total_imported += 1;
    }

    fn fail(&mut self, kind: &str, id: &str, err: &BankError) {
        tracing::warn!(kind, id, error = %err, "import record rejected");
        self.failed.push(ImportFailure {
            kind: kind.to_string(),
            id: id.to_string(),
            error: err.to_string(),
            error_kind: err.kind(),
        });
    }

    fn record<T>(&mut self, kind: &'static str, id: &str, result: Result<T>) {
        match result {
            Ok(_) => self.ok(kind),
            Err(e) => self.fail(kind, id, &e),
        }
    }
}

pub fn export(conn: &Connection, scope: &BranchScope) -> Result<BankSnapshot> {
    let snapshot = BankSnapshot {
        format_version: SNAPSHOT_FORMAT_VERSION,
        repository: scope.repository.clone(),
        branch: scope.branch.clone(),
        exported_at: now(),
        metadata: metadata::get(conn, scope)?,
        contexts: context::list(conn, scope, ALL_ROWS, 0)?,
        components: component::list(conn, scope, ALL_ROWS, 0)?,
        decisions: decision::list(conn, scope, ALL_ROWS, 0)?,
        rules: rule::list(conn, scope, ALL_ROWS, 0)?,
        tags: tag::list(conn, scope, ALL_ROWS, 0)?,
        files: file::list(conn, scope, ALL_ROWS, 0)?,
        tag_assignments: tag::all_assignments(conn, scope)?
            .into_iter()
            .map(|(tag_id, item)| TagAssignment { tag_id, item })
            .collect(),
    };
    tracing::info!(scope = %scope, records = snapshot.record_count(), "bank exported");
    Ok(snapshot)
}

/// Apply `snapshot` to `scope`, which may differ from the exported scope.
pub fn import(conn: &mut Connection, scope: &BranchScope, snapshot: &BankSnapshot) -> ImportReport {
    let mut report = ImportReport::default();

    if let Some(meta) = &snapshot.metadata {
        let mut meta = meta.clone();
        meta.id = metadata::METADATA_ID.to_string();
        meta.updated_at = now();
        if meta.created_at.is_empty() {
            meta.created_at = meta.updated_at.clone();
        }
        report.record("metadata", metadata::METADATA_ID, metadata::save(conn, scope, &meta));
    }

    for t in &snapshot.tags {
        report.record("tag", &t.id, apply_tag(conn, scope, &TagInput::from(t)));
    }

    import_components(conn, scope, &snapshot.components, &mut report);

    for d in &snapshot.decisions {
        report.record("decision", &d.id, apply_decision(conn, scope, &DecisionInput::from(d)));
    }
    for r in &snapshot.rules {
        report.record("rule", &r.id, apply_rule(conn, scope, &RuleInput::from(r)));
    }

    for f in &snapshot.files {
        match apply_file(conn, scope, &FileInput::from(f)) {
            Ok(_) => {
                report.ok("file");
                for component_id in &f.components {
                    if let Err(e) = apply_association(conn, scope, &f.id, component_id) {
                        report.fail("belongs_to", &format!("{}->{component_id}", f.id), &e);
                    }
                }
            }
            Err(e) => report.fail("file", &f.id, &e),
        }
    }

    for ctx in &snapshot.contexts {
        report.record("context", &ctx.id, import_context(conn, scope, ctx));
    }

    for a in &snapshot.tag_assignments {
        let id = format!("{}:{}", a.item.kind, a.item.id);
        report.record("tag_assignment", &id, apply_tag_item(conn, scope, &a.item, &a.tag_id));
    }

    tracing::info!(
        scope = %scope,
        imported = report.total_imported,
        failed = report.failed.len(),
        "bank imported"
    );
    report
}

/// Apply components in passes until no more dangling references resolve.
fn import_components(
    conn: &mut Connection,
    scope: &BranchScope,
    components: &[Component],
    report: &mut ImportReport,
) {
    let mut pending: Vec<&Component> = components.iter().collect();
    loop {
        let before = pending.len();
        let mut deferred = Vec::new();
        for c in pending {
            match apply_component(conn, scope, &ComponentInput::from(c)) {
                Ok(_) => report.ok("component"),
                Err(e @ BankError::InvalidReference { .. }) => deferred.push((c, e)),
                Err(e) => report.fail("component", &c.id, &e),
            }
        }
        if deferred.is_empty() || deferred.len() == before {
            for (c, e) in &deferred {
                report.fail("component", &c.id, e);
            }
            return;
        }
        pending = deferred.into_iter().map(|(c, _)| c).collect();
    }
}

fn import_context(conn: &mut Connection, scope: &BranchScope, ctx: &Context) -> Result<()> {
    let mut fields = Vec::new();
    check_date(&mut fields, "iso_date", &ctx.iso_date);
    if !fields.is_empty() {
        return Err(BankError::Validation(fields));
    }
    let mut ctx = ctx.clone();
    ctx.id = format!("ctx-{}", ctx.iso_date);
    ctx.updated_at = now();
    if ctx.created_at.is_empty() {
        ctx.created_at = ctx.updated_at.clone();
    }
    context::save(conn, scope, &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::types::{ComponentStatus, EntityKind};

    fn component(id: &str, deps: &[&str]) -> Component {
        Component {
            id: id.into(),
            name: id.into(),
            kind: "service".into(),
            status: ComponentStatus::Active,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn empty_snapshot() -> BankSnapshot {
        serde_json::from_str(r#"{"repository":"acme","branch":"main"}"#).unwrap()
    }

    #[test]
    fn components_import_out_of_order() {
        let mut conn = crate::db::open_in_memory().unwrap();
        let scope = BranchScope::new("acme", "main").unwrap();
        let mut snapshot = empty_snapshot();
        snapshot.components = vec![component("c", &["b"]), component("b", &["a"]), component("a", &[])];

        let report = import(&mut conn, &scope, &snapshot);
        assert!(report.failed.is_empty());
        assert_eq!(report.imported["component"], 3);
        assert_eq!(component::dependency_ids(&conn, &scope, "c").unwrap(), vec!["b"]);
    }

    #[test]
    fn bad_records_fail_individually() {
        let mut conn = crate::db::open_in_memory().unwrap();
        let scope = BranchScope::new("acme", "main").unwrap();
        let mut snapshot = empty_snapshot();
        snapshot.components = vec![component("a", &[]), component("b", &["ghost"])];

        let report = import(&mut conn, &scope, &snapshot);
        assert_eq!(report.total_imported, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "b");
        assert_eq!(report.failed[0].error_kind, "invalid_reference");
    }

    #[test]
    fn snapshot_defaults_missing_sections() {
        let snapshot = empty_snapshot();
        assert_eq!(snapshot.format_version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(snapshot.record_count(), 0);
        assert!(snapshot.metadata.is_none());
    }

    #[test]
    fn export_includes_tag_assignments() {
        let mut conn = crate::db::open_in_memory().unwrap();
        let scope = BranchScope::new("acme", "main").unwrap();
        apply_component(&mut conn, &scope, &ComponentInput::from(&component("a", &[]))).unwrap();
        apply_tag(
            &mut conn,
            &scope,
            &TagInput {
                id: "core".into(),
                name: "Core".into(),
                color: None,
                description: None,
            },
        )
        .unwrap();
        apply_tag_item(&mut conn, &scope, &ItemRef::new(EntityKind::Component, "a"), "core").unwrap();

        let snapshot = export(&conn, &scope).unwrap();
        assert_eq!(snapshot.components.len(), 1);
        assert_eq!(snapshot.tag_assignments.len(), 1);
        assert_eq!(snapshot.tag_assignments[0].tag_id, "core");
    }
}
