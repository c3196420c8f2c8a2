//! Property tests over whole cupboards.

use cupboard_core::{CoreError, Entity, Filter, Property, TableName};
use cupboard_testkit::prelude::*;
use proptest::prelude::*;

fn all(fixture: &TestCupboard, table: &str) -> Vec<Entity> {
    fixture.table(table).unwrap().fetch(&Filter::new()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn every_crumb_has_every_property(steps in steps_strategy(12)) {
        init_tracing();
        let mut fixture = TestCupboard::new();
        for (i, step) in steps.into_iter().enumerate() {
            match step {
                Step::Crumb(crumb) => {
                    fixture.table("crumbs").unwrap().set("", crumb).unwrap();
                }
                Step::Property(value_type) => {
                    let definition = Property {
                        name: format!("p{i}"),
                        value_type: value_type.as_str().to_string(),
                        ..Default::default()
                    };
                    fixture.table("properties").unwrap().set("", definition).unwrap();
                }
            }
        }

        for _ in 0..2 {
            let property_ids: Vec<String> = all(&fixture, "properties").iter().map(Entity::id).collect();
            for entity in all(&fixture, "crumbs") {
                let crumb = expect_crumb(entity);
                prop_assert_eq!(crumb.properties.len(), property_ids.len());
                for id in &property_ids {
                    prop_assert!(crumb.properties.contains_key(id));
                }
            }
            fixture.reattach();
        }
    }

    #[test]
    fn text_properties_take_only_strings(
        name in property_name_strategy(),
        value in json_scalar_strategy(),
    ) {
        let fixture = TestCupboard::new();
        let text_id = fixture.table("properties").unwrap().set("", property(&name, "text")).unwrap();
        let crumbs = fixture.table("crumbs").unwrap();
        let id = crumbs.set("", crumb("typed", "draft")).unwrap();

        let mut payload = expect_crumb(crumbs.get(&id).unwrap());
        payload.properties.insert(text_id.clone(), value.clone());
        let result = crumbs.set(&id, payload);

        let stored = expect_crumb(crumbs.get(&id).unwrap());
        if value.is_string() {
            prop_assert!(result.is_ok());
            prop_assert_eq!(&stored.properties[&text_id], &value);
        } else {
            prop_assert!(matches!(result, Err(CoreError::InvalidData { .. })), "expected InvalidData error");
            prop_assert_eq!(&stored.properties[&text_id], &serde_json::json!(""));
        }
    }

    #[test]
    fn round_trip_preserves_crumbs(crumbs in prop::collection::vec(crumb_strategy(), 0..12)) {
        let mut fixture = TestCupboard::deferred();
        for crumb in crumbs {
            fixture.table("crumbs").unwrap().set("", crumb).unwrap();
        }
        let before = all(&fixture, "crumbs");
        fixture.reattach();
        let after = all(&fixture, "crumbs");
        prop_assert_eq!(before, after);
    }

    #[test]
    fn junk_lines_never_block_attach(junk in prop::collection::vec(junk_line_strategy(), 1..8)) {
        let lines: Vec<&str> = junk.iter().map(String::as_str).collect();
        let fixture = TestCupboard::prepared(cupboard_core::Durability::Immediate, |dir| {
            write_ledger(dir, TableName::Crumbs, &lines);
        });
        prop_assert!(all(&fixture, "crumbs").is_empty());
    }
}
