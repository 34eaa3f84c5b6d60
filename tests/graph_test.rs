mod helpers;

use chrono::NaiveDate;
use memory_bank::bank::graph::{PathEnd, ProjectionRequest};
use memory_bank::bank::types::{ContextUpdate, EntityKind};
use memory_bank::db::algorithms::PageRankConfig;
use memory_bank::db::projection::{Direction, EdgeTable};
use memory_bank::error::BankError;

/// acme/main with B depending on A.
fn acme() -> (memory_bank::bank::MemoryService, memory_bank::bank::types::BranchScope) {
    let bank = helpers::test_bank();
    let scope = helpers::scope("acme", "main");
    bank.init_bank(&scope).unwrap();
    bank.upsert_component(&scope, &helpers::component("A", &[])).unwrap();
    bank.upsert_component(&scope, &helpers::component("B", &["A"])).unwrap();
    (bank, scope)
}

#[test]
fn acme_dependencies_and_dependents() {
    let (bank, scope) = acme();

    let deps = bank.dependencies(&scope, "B", 1).unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].id, "A");

    let dependents = bank.dependents(&scope, "A").unwrap();
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].id, "B");

    assert!(bank.dependencies(&scope, "A", 1).unwrap().is_empty());
}

#[test]
fn acme_shortest_path_follows_direction() {
    let (bank, scope) = acme();

    let forward = bank
        .shortest_path(&scope, "B", "A", &[], Direction::Outgoing)
        .unwrap();
    assert!(forward.path_found);
    assert_eq!(forward.length, 1);
    let ids: Vec<&str> = forward.path.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["B", "A"]);

    let backward = bank
        .shortest_path(&scope, "A", "B", &[EdgeTable::DependsOn], Direction::Outgoing)
        .unwrap();
    assert!(!backward.path_found);

    let either = bank
        .shortest_path(&scope, "A", "B", &[], Direction::Both)
        .unwrap();
    assert!(either.path_found);
}

#[test]
fn reflexive_path_is_never_found() {
    let (bank, scope) = acme();
    let result = bank
        .shortest_path(&scope, "A", "A", &[], Direction::Both)
        .unwrap();
    assert!(!result.path_found);
    assert!(result.path.is_empty());
    assert_eq!(result.length, 0);

    // Holds even for ids that do not exist.
    let result = bank
        .shortest_path(&scope, "nope", "nope", &[], Direction::Outgoing)
        .unwrap();
    assert!(!result.path_found);
}

#[test]
fn shared_ids_need_a_node_type() {
    let (bank, scope) = acme();
    bank.upsert_decision(&scope, &helpers::decision("A", "2026-03-01", &["A"]))
        .unwrap();

    let err = bank
        .shortest_path(&scope, "A", "B", &[EdgeTable::Governs], Direction::Both)
        .unwrap_err();
    let BankError::Validation(fields) = err else {
        panic!("expected validation error");
    };
    assert_eq!(fields[0].field, "start_node_type");

    let decision_to_component = bank
        .shortest_path(
            &scope,
            PathEnd::new("A", Some(EntityKind::Decision)),
            PathEnd::new("A", Some(EntityKind::Component)),
            &[EdgeTable::Governs],
            Direction::Outgoing,
        )
        .unwrap();
    assert!(decision_to_component.path_found);
    let labels: Vec<&str> = decision_to_component.path.iter().map(|n| n.label).collect();
    assert_eq!(labels, vec!["Decision", "Component"]);

    let pinned = bank
        .shortest_path(
            &scope,
            PathEnd::new("B", Some(EntityKind::Component)),
            PathEnd::new("A", Some(EntityKind::Component)),
            &[],
            Direction::Outgoing,
        )
        .unwrap();
    assert_eq!(pinned.length, 1);
}

#[test]
fn transitive_dependencies_respect_depth() {
    let bank = helpers::test_bank();
    let scope = helpers::scope("acme", "main");
    bank.upsert_component(&scope, &helpers::component("db", &[])).unwrap();
    bank.upsert_component(&scope, &helpers::component("api", &["db"])).unwrap();
    bank.upsert_component(&scope, &helpers::component("web", &["api"])).unwrap();

    let one: Vec<String> = bank.dependencies(&scope, "web", 1).unwrap().into_iter().map(|c| c.id).collect();
    let two: Vec<String> = bank.dependencies(&scope, "web", 2).unwrap().into_iter().map(|c| c.id).collect();
    assert_eq!(one, vec!["api"]);
    assert_eq!(two, vec!["api", "db"]);
}

#[test]
fn unknown_component_is_not_found() {
    let (bank, scope) = acme();
    assert!(matches!(
        bank.dependencies(&scope, "ghost", 1),
        Err(BankError::NotFound { .. })
    ));
    assert!(matches!(
        bank.shortest_path(&scope, "A", "ghost", &[], Direction::Outgoing),
        Err(BankError::NotFound { .. })
    ));
}

#[test]
fn contextual_history_follows_governance() {
    let (bank, scope) = acme();
    bank.upsert_decision(&scope, &helpers::decision("dec-1", "2026-02-01", &["A"]))
        .unwrap();
    let day = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
    bank.update_context_on(
        &scope,
        day,
        &ContextUpdate {
            summary: Some("chose the storage engine".into()),
            decisions: vec!["dec-1".into()],
            ..Default::default()
        },
    )
    .unwrap();

    let for_component = bank.contextual_history(&scope, "A", EntityKind::Component).unwrap();
    assert_eq!(for_component.len(), 1);
    assert_eq!(for_component[0].iso_date, "2026-02-01");

    assert!(bank.contextual_history(&scope, "B", EntityKind::Component).unwrap().is_empty());
    assert!(matches!(
        bank.contextual_history(&scope, "A", EntityKind::Tag),
        Err(BankError::Validation(_))
    ));
}

#[test]
fn related_items_cover_every_edge_type() {
    let (bank, scope) = acme();
    bank.upsert_rule(&scope, &helpers::rule("rule-1", &["A"])).unwrap();

    let items = bank
        .related_items(&scope, "A", 1, &[], Direction::Both)
        .unwrap();
    let labels: Vec<(&str, &str)> = items.iter().map(|i| (i.node.label, i.node.id.as_str())).collect();
    assert!(labels.contains(&("Component", "B")));
    assert!(labels.contains(&("Rule", "rule-1")));
    assert!(items.iter().all(|i| i.distance == 1));
}

#[test]
fn pagerank_reports_each_iteration() {
    let (bank, scope) = acme();
    let request = ProjectionRequest {
        name: "deps".into(),
        node_tables: vec!["Component".into()],
        edge_tables: vec!["DEPENDS_ON".into()],
    };
    let mut iterations = Vec::new();
    let result = bank
        .pagerank(&scope, &request, PageRankConfig::default(), |i, _| iterations.push(i))
        .unwrap();

    assert_eq!(result.status, "complete");
    assert_eq!(result.projected_graph_name, "deps");
    let ranks = result.ranks.unwrap();
    let a = ranks.iter().find(|r| r.node.id == "A").unwrap().rank;
    let b = ranks.iter().find(|r| r.node.id == "B").unwrap().rank;
    assert!(a > b);
    assert_eq!(iterations.first(), Some(&1));
}

#[test]
fn projection_rejects_unknown_tables() {
    let (bank, scope) = acme();
    let request = ProjectionRequest {
        name: "bad".into(),
        node_tables: vec!["Widget".into()],
        edge_tables: vec![],
    };
    match bank.weakly_connected_components(&scope, &request) {
        Err(BankError::Validation(fields)) => {
            let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
            assert!(names.contains(&"node_table_names"));
            assert!(names.contains(&"relationship_table_names"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
