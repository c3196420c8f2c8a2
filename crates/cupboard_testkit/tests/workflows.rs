//! Multi-step workflows through the fixture.

use cupboard_core::{Filter, Link, TableName, Trail};
use cupboard_testkit::prelude::*;
use serde_json::json;

#[test]
fn trail_lifecycle_survives_reattach() {
    init_tracing();
    let mut fixture = TestCupboard::new();
    let trail_id = fixture.table("sessions").unwrap().set("", trail("")).unwrap();
    let kept = fixture.table("items").unwrap().set("", crumb("kept", "taken")).unwrap();
    fixture
        .table("links")
        .unwrap()
        .set("", link(Link::BELONGS_TO, &kept, &trail_id))
        .unwrap();

    fixture
        .table("sessions")
        .unwrap()
        .set(&trail_id, trail(Trail::COMPLETED))
        .unwrap();
    fixture.reattach();

    let stored = expect_trail(fixture.table("trails").unwrap().get(&trail_id).unwrap());
    assert_eq!(stored.state, "completed");
    assert!(stored.completed_at.is_some());
    assert!(fixture.table("crumbs").unwrap().get(&kept).is_ok());
    assert!(fixture.ledger_lines(TableName::Links).is_empty());
}

#[test]
fn category_default_follows_ordinal() {
    let fixture = TestCupboard::new();
    let priority = property_id(&fixture, "priority");
    let categories = fixture
        .table("categories")
        .unwrap()
        .fetch(&Filter::new().with("property_id", priority.as_str()))
        .unwrap();
    let highest = categories
        .iter()
        .filter_map(|e| e.as_category())
        .find(|c| c.name == "highest")
        .unwrap()
        .id
        .clone();

    let id = fixture.table("crumbs").unwrap().set("", crumb("urgent?", "draft")).unwrap();
    let stored = expect_crumb(fixture.table("crumbs").unwrap().get(&id).unwrap());
    assert_eq!(stored.properties[&priority], json!(highest));

    fixture.table("categories").unwrap().delete(&highest).unwrap();
    let stored = expect_crumb(fixture.table("crumbs").unwrap().get(&id).unwrap());
    let high = categories
        .iter()
        .filter_map(|e| e.as_category())
        .find(|c| c.name == "high")
        .unwrap();
    assert_eq!(stored.properties[&priority], json!(high.id));
}

#[test]
fn deferred_fixture_flushes_on_reattach() {
    let mut fixture = TestCupboard::deferred();
    for i in 0..5 {
        fixture
            .table("crumbs")
            .unwrap()
            .set("", crumb(&format!("c{i}"), "draft"))
            .unwrap();
    }
    fixture.reattach();
    assert_eq!(fixture.ledger_lines(TableName::Crumbs).len(), 5);
    assert_eq!(fixture.ledger_lines(TableName::CrumbProperties).len(), 25);
}
