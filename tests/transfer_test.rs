mod helpers;

use chrono::NaiveDate;
use memory_bank::bank::types::{ContextUpdate, EntityKind, ItemRef, MetadataUpdate};

#[test]
fn export_then_import_into_another_branch() {
    let bank = helpers::test_bank();
    let main = helpers::scope("acme", "main");
    let feature = helpers::scope("acme", "feature-x");

    bank.update_metadata(
        &main,
        &MetadataUpdate {
            project_name: Some("Acme".into()),
            ..Default::default()
        },
    )
    .unwrap();
    bank.upsert_tag(&main, &helpers::tag("core")).unwrap();
    bank.upsert_component(&main, &helpers::component("a", &[])).unwrap();
    bank.upsert_component(&main, &helpers::component("b", &["a"])).unwrap();
    bank.upsert_decision(&main, &helpers::decision("d1", "2026-04-02", &["a"]))
        .unwrap();
    bank.upsert_rule(&main, &helpers::rule("r1", &["b"])).unwrap();
    bank.tag_item(&main, &ItemRef::new(EntityKind::Component, "a"), "core")
        .unwrap();
    bank.update_context_on(
        &main,
        NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
        &ContextUpdate {
            summary: Some("picked sqlite".into()),
            decisions: vec!["d1".into()],
            ..Default::default()
        },
    )
    .unwrap();

    let snapshot = bank.export(&main).unwrap();
    assert_eq!(snapshot.components.len(), 2);
    assert_eq!(snapshot.tag_assignments.len(), 1);

    let report = bank.import(&feature, &snapshot).unwrap();
    assert!(report.failed.is_empty(), "failures: {:?}", report.failed);
    assert_eq!(report.total_imported, snapshot.record_count());

    let source = bank.stats(&main).unwrap();
    let copy = bank.stats(&feature).unwrap();
    assert_eq!(source.nodes, copy.nodes);
    assert_eq!(source.edges, copy.edges);

    assert_eq!(bank.get_metadata(&feature).unwrap().content.project.name, "Acme");
    let history = bank
        .contextual_history(&feature, "a", EntityKind::Component)
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(bank.items_by_tag(&feature, "core").unwrap().len(), 1);
}

#[test]
fn components_import_regardless_of_order() {
    let bank = helpers::test_bank();
    let main = helpers::scope("acme", "main");
    let other = helpers::scope("acme", "copy");
    bank.upsert_component(&main, &helpers::component("base", &[])).unwrap();
    bank.upsert_component(&main, &helpers::component("mid", &["base"])).unwrap();
    bank.upsert_component(&main, &helpers::component("top", &["mid"])).unwrap();

    let mut snapshot = bank.export(&main).unwrap();
    snapshot.components.reverse();
    let report = bank.import(&other, &snapshot).unwrap();

    assert!(report.failed.is_empty());
    assert_eq!(bank.dependencies(&other, "top", 2).unwrap().len(), 2);
}

#[test]
fn dangling_records_are_reported_not_fatal() {
    let bank = helpers::test_bank();
    let main = helpers::scope("acme", "main");
    let other = helpers::scope("acme", "copy");
    bank.upsert_component(&main, &helpers::component("a", &[])).unwrap();
    bank.upsert_component(&main, &helpers::component("b", &["a"])).unwrap();

    let mut snapshot = bank.export(&main).unwrap();
    snapshot.components.retain(|c| c.id == "b");
    let report = bank.import(&other, &snapshot).unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].id, "b");
    assert_eq!(report.failed[0].error_kind, "invalid_reference");
}
