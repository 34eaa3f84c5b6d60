//! Single and bulk deletion with dry-run and confirmation gates.
//!
//! Resolution is read-only; nothing is removed unless the request is neither
//! a dry run nor an unconfirmed bulk request. Edges whose source is
//! polymorphic (`GOVERNS` from decisions and rules, `TAGGED_WITH` from any
//! item) are removed explicitly; the remaining edges go through the
//! `ON DELETE CASCADE` foreign keys.

use rusqlite::{params, Connection};
use serde::Serialize;

use super::types::{BranchScope, EntityKind, ItemRef};
use super::{exists, list_ids, tag};
use crate::error::{BankError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    Single { kind: EntityKind, id: String },
    ByTag { tag_id: String },
    ByType { kind: EntityKind },
}

impl DeleteTarget {
    fn is_bulk(&self) -> bool {
        !matches!(self, Self::Single { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub target: DeleteTarget,
    pub dry_run: bool,
    pub confirm: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    DryRun,
    Deleted,
    ConfirmationRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub status: DeleteStatus,
    /// Items affected, or that would be affected.
    pub count: usize,
    pub items: Vec<ItemRef>,
    pub message: String,
}

/// Items the request addresses, without mutating anything.
pub fn resolve(conn: &Connection, scope: &BranchScope, target: &DeleteTarget) -> Result<Vec<ItemRef>> {
    match target {
        DeleteTarget::Single { kind, id } => {
            if !exists(conn, scope, *kind, id)? {
                return Err(BankError::not_found(kind.as_str(), id.clone()));
            }
            Ok(vec![ItemRef::new(*kind, id.clone())])
        }
        DeleteTarget::ByTag { tag_id } => {
            if !exists(conn, scope, EntityKind::Tag, tag_id)? {
                return Err(BankError::not_found("tag", tag_id.clone()));
            }
            tag::items_with_tag(conn, scope, tag_id)
        }
        DeleteTarget::ByType { kind } => Ok(list_ids(conn, scope, *kind)?
            .into_iter()
            .map(|id| ItemRef::new(*kind, id))
            .collect()),
    }
}

/// Run the request. Callers wrap this in a transaction so a failed bulk
/// delete leaves the branch untouched.
pub fn execute(conn: &Connection, scope: &BranchScope, request: &DeleteRequest) -> Result<DeleteOutcome> {
    let items = resolve(conn, scope, &request.target)?;
    let count = items.len();

    if request.dry_run {
        return Ok(DeleteOutcome {
            status: DeleteStatus::DryRun,
            count,
            message: format!("dry run: {count} item(s) would be deleted"),
            items,
        });
    }
    if request.target.is_bulk() && !request.confirm {
        return Ok(DeleteOutcome {
            status: DeleteStatus::ConfirmationRequired,
            count,
            message: format!(
                "bulk delete of {count} item(s) requires confirm=true; nothing was deleted"
            ),
            items,
        });
    }

    for item in &items {
        delete_item(conn, scope, item)?;
    }
    tracing::info!(scope = %scope, count, "entities deleted");
    Ok(DeleteOutcome {
        status: DeleteStatus::Deleted,
        count,
        message: format!("{count} item(s) deleted"),
        items,
    })
}

/// Remove one node and every edge touching it.
fn delete_item(conn: &Connection, scope: &BranchScope, item: &ItemRef) -> Result<()> {
    if matches!(item.kind, EntityKind::Decision | EntityKind::Rule) {
        conn.execute(
            "DELETE FROM governs \
             WHERE repository = ?1 AND branch = ?2 AND source_kind = ?3 AND source_id = ?4",
            params![scope.repository, scope.branch, item.kind.as_str(), item.id],
        )?;
    }
    conn.execute(
        "DELETE FROM tagged_with \
         WHERE repository = ?1 AND branch = ?2 AND item_kind = ?3 AND item_id = ?4",
        params![scope.repository, scope.branch, item.kind.as_str(), item.id],
    )?;
    conn.execute(
        &format!(
            "DELETE FROM {} WHERE repository = ?1 AND branch = ?2 AND id = ?3",
            item.kind.table()
        ),
        params![scope.repository, scope.branch, item.id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::component;
    use crate::bank::types::{ComponentInput, ComponentStatus, TagInput};

    fn component_input(id: &str, deps: &[&str]) -> ComponentInput {
        ComponentInput {
            id: id.into(),
            name: id.into(),
            kind: "service".into(),
            status: ComponentStatus::Active,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn setup() -> (Connection, BranchScope) {
        let conn = crate::db::open_in_memory().unwrap();
        let scope = BranchScope::new("acme", "main").unwrap();
        component::upsert(&conn, &scope, &component_input("a", &[])).unwrap();
        component::upsert(&conn, &scope, &component_input("b", &["a"])).unwrap();
        tag::upsert(
            &conn,
            &scope,
            &TagInput {
                id: "legacy".into(),
                name: "Legacy".into(),
                color: None,
                description: None,
            },
        )
        .unwrap();
        tag::attach(&conn, &scope, &ItemRef::new(EntityKind::Component, "a"), "legacy").unwrap();
        (conn, scope)
    }

    #[test]
    fn bulk_requires_confirmation() {
        let (conn, scope) = setup();
        let request = DeleteRequest {
            target: DeleteTarget::ByType {
                kind: EntityKind::Component,
            },
            dry_run: false,
            confirm: false,
        };
        let outcome = execute(&conn, &scope, &request).unwrap();
        assert_eq!(outcome.status, DeleteStatus::ConfirmationRequired);
        assert_eq!(crate::bank::count(&conn, &scope, EntityKind::Component).unwrap(), 2);
    }

    #[test]
    fn deleting_component_drops_its_edges() {
        let (conn, scope) = setup();
        let request = DeleteRequest {
            target: DeleteTarget::Single {
                kind: EntityKind::Component,
                id: "a".into(),
            },
            dry_run: false,
            confirm: false,
        };
        let outcome = execute(&conn, &scope, &request).unwrap();
        assert_eq!(outcome.status, DeleteStatus::Deleted);
        assert!(component::dependency_ids(&conn, &scope, "b").unwrap().is_empty());
        assert!(tag::items_with_tag(&conn, &scope, "legacy").unwrap().is_empty());
        assert!(exists(&conn, &scope, EntityKind::Tag, "legacy").unwrap());
    }

    #[test]
    fn missing_single_target_is_not_found() {
        let (conn, scope) = setup();
        let request = DeleteRequest {
            target: DeleteTarget::Single {
                kind: EntityKind::Rule,
                id: "nope".into(),
            },
            dry_run: true,
            confirm: false,
        };
        assert_eq!(execute(&conn, &scope, &request).unwrap_err().kind(), "not_found");
    }
}
