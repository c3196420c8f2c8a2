//! Referential cleanup run inside a write transaction.
//!
//! Each function takes the transaction's connection and the triggering id,
//! applies its changes to the cache and records the matching ledger
//! changes in the batch. Nothing reaches a ledger until the transaction
//! commits.

use crate::cache::row::{self, Predicate};
use crate::entity::{Category, Crumb, CrumbProperty, Link, Metadata, Property};
use crate::error::CoreResult;
use crate::mirror::MirrorBatch;
use crate::property;
use rusqlite::Connection;
use tracing::debug;

/// Removes every link with `id` as either endpoint.
pub(crate) fn delete_links_touching(
    conn: &Connection,
    id: &str,
    batch: &mut MirrorBatch,
) -> CoreResult<usize> {
    let mut removed = row::delete_where::<Link>(conn, &[Predicate::text("from_id", id)])?;
    removed.extend(row::delete_where::<Link>(conn, &[Predicate::text("to_id", id)])?);
    batch.remove(&removed);
    Ok(removed.len())
}

/// Deletes a crumb with its property values, metadata and links.
///
/// Returns the deleted crumb, or `None` if it did not exist.
pub(crate) fn delete_crumb(
    conn: &Connection,
    crumb_id: &str,
    batch: &mut MirrorBatch,
) -> CoreResult<Option<Crumb>> {
    let values = row::delete_where::<CrumbProperty>(conn, &[Predicate::text("crumb_id", crumb_id)])?;
    batch.remove(&values);
    let notes = row::delete_where::<Metadata>(conn, &[Predicate::text("crumb_id", crumb_id)])?;
    batch.remove(&notes);
    let links = delete_links_touching(conn, crumb_id, batch)?;

    let crumb = row::delete::<Crumb>(conn, &[crumb_id])?;
    if let Some(crumb) = &crumb {
        batch.remove(std::slice::from_ref(crumb));
        debug!(
            id = crumb_id,
            values = values.len(),
            metadata = notes.len(),
            links,
            "crumb deleted"
        );
    }
    Ok(crumb)
}

/// Releases the members of a completed trail: removes the `belongs_to`
/// links into it. The crumbs stay.
pub(crate) fn complete_trail(conn: &Connection, trail_id: &str, batch: &mut MirrorBatch) -> CoreResult<usize> {
    let released = row::delete_where::<Link>(
        conn,
        &[
            Predicate::text("link_type", Link::BELONGS_TO),
            Predicate::text("to_id", trail_id),
        ],
    )?;
    batch.remove(&released);
    debug!(trail = trail_id, released = released.len(), "trail completed");
    Ok(released.len())
}

/// Deletes every member crumb of an abandoned trail, then every link
/// touching the trail.
pub(crate) fn abandon_trail(conn: &Connection, trail_id: &str, batch: &mut MirrorBatch) -> CoreResult<usize> {
    let memberships: Vec<Link> = row::select(
        conn,
        &[
            Predicate::text("link_type", Link::BELONGS_TO),
            Predicate::text("to_id", trail_id),
        ],
    )?;
    let mut deleted = 0;
    for membership in &memberships {
        if delete_crumb(conn, &membership.from_id, batch)?.is_some() {
            deleted += 1;
        }
    }
    delete_links_touching(conn, trail_id, batch)?;
    debug!(trail = trail_id, deleted, "trail abandoned");
    Ok(deleted)
}

/// Deletes a property with its categories and values. Metadata scoped to
/// it loses the scope.
pub(crate) fn delete_property(
    conn: &Connection,
    property_id: &str,
    batch: &mut MirrorBatch,
) -> CoreResult<Option<Property>> {
    let values =
        row::delete_where::<CrumbProperty>(conn, &[Predicate::text("property_id", property_id)])?;
    batch.remove(&values);
    let categories = row::delete_where::<Category>(conn, &[Predicate::text("property_id", property_id)])?;
    batch.remove(&categories);

    let scoped: Vec<Metadata> = row::select(conn, &[Predicate::text("property_id", property_id)])?;
    for mut note in scoped {
        note.property_id = None;
        row::upsert(conn, &note)?;
        batch.upsert(&note)?;
    }

    let property = row::delete::<Property>(conn, &[property_id])?;
    if let Some(property) = &property {
        batch.remove(std::slice::from_ref(property));
    }
    Ok(property)
}

/// Deletes a category. Crumb values naming it fall back to the property's
/// new default.
pub(crate) fn delete_category(
    conn: &Connection,
    category_id: &str,
    batch: &mut MirrorBatch,
) -> CoreResult<Option<Category>> {
    let Some(category) = row::delete::<Category>(conn, &[category_id])? else {
        return Ok(None);
    };
    batch.remove(std::slice::from_ref(&category));

    let Some(property) = row::find::<Property>(conn, &[category.property_id.as_str()])? else {
        return Ok(Some(category));
    };
    let default = property::default_for(conn, &property)?;
    let stored = serde_json::to_string(&category.id)?;
    let affected: Vec<CrumbProperty> = row::select(
        conn,
        &[
            Predicate::text("property_id", &property.id),
            Predicate::text("value", &stored),
        ],
    )?;
    for mut value in affected {
        value.value = default.clone();
        row::upsert(conn, &value)?;
        batch.upsert(&value)?;
    }
    Ok(Some(category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::schema;
    use crate::entity::{time, Trail};
    use serde_json::json;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::install(&conn).unwrap();
        conn
    }

    fn add_crumb(conn: &Connection, id: &str, batch: &mut MirrorBatch) {
        let crumb = Crumb {
            id: id.into(),
            name: id.into(),
            state: "draft".into(),
            created_at: time::now(),
            updated_at: time::now(),
            ..Default::default()
        };
        row::upsert(conn, &crumb).unwrap();
        property::init_crumb(conn, id, batch).unwrap();
    }

    fn add_link(conn: &Connection, id: &str, link_type: &str, from: &str, to: &str) {
        row::upsert(
            conn,
            &Link {
                id: id.into(),
                link_type: link_type.into(),
                from_id: from.into(),
                to_id: to.into(),
                created_at: time::now(),
            },
        )
        .unwrap();
    }

    fn add_trail(conn: &Connection, id: &str) {
        row::upsert(
            conn,
            &Trail {
                id: id.into(),
                state: "active".into(),
                created_at: time::now(),
                completed_at: None,
            },
        )
        .unwrap();
    }

    fn count_for(conn: &Connection, id: &str) -> (i64, i64, i64) {
        (
            row::count::<CrumbProperty>(conn, &[Predicate::text("crumb_id", id)]).unwrap(),
            row::count::<Metadata>(conn, &[Predicate::text("crumb_id", id)]).unwrap(),
            row::count::<Link>(conn, &[Predicate::text("from_id", id)]).unwrap()
                + row::count::<Link>(conn, &[Predicate::text("to_id", id)]).unwrap(),
        )
    }

    #[test]
    fn crumb_delete_removes_dependents() {
        let conn = conn();
        let mut batch = MirrorBatch::new();
        property::seed_builtins(&conn, &mut batch).unwrap();
        add_crumb(&conn, "a", &mut batch);
        add_crumb(&conn, "b", &mut batch);
        add_link(&conn, "l1", Link::CHILD_OF, "a", "b");
        add_link(&conn, "l2", Link::CHILD_OF, "b", "a");
        row::upsert(
            &conn,
            &Metadata {
                id: "m1".into(),
                table_name: "comments".into(),
                crumb_id: "a".into(),
                content: "hello".into(),
                created_at: time::now(),
                ..Default::default()
            },
        )
        .unwrap();

        let mut batch = MirrorBatch::new();
        let deleted = delete_crumb(&conn, "a", &mut batch).unwrap();
        assert_eq!(deleted.unwrap().id, "a");
        assert_eq!(count_for(&conn, "a"), (0, 0, 0));
        assert_eq!(count_for(&conn, "b").0, 5);
        assert_eq!(
            batch.tables(),
            vec![
                crate::entity::TableName::CrumbProperties,
                crate::entity::TableName::Metadata,
                crate::entity::TableName::Links,
                crate::entity::TableName::Crumbs,
            ]
        );

        assert!(delete_crumb(&conn, "a", &mut batch).unwrap().is_none());
    }

    #[test]
    fn completing_releases_members() {
        let conn = conn();
        let mut batch = MirrorBatch::new();
        add_trail(&conn, "t");
        add_crumb(&conn, "a", &mut batch);
        add_link(&conn, "l1", Link::BELONGS_TO, "a", "t");
        add_link(&conn, "l2", Link::BRANCHES_FROM, "t", "a");

        assert_eq!(complete_trail(&conn, "t", &mut batch).unwrap(), 1);
        assert!(row::find::<Crumb>(&conn, &["a"]).unwrap().is_some());
        assert!(row::find::<Link>(&conn, &["l1"]).unwrap().is_none());
        assert!(row::find::<Link>(&conn, &["l2"]).unwrap().is_some());
    }

    #[test]
    fn abandoning_deletes_members() {
        let conn = conn();
        let mut batch = MirrorBatch::new();
        property::seed_builtins(&conn, &mut batch).unwrap();
        add_trail(&conn, "t");
        add_crumb(&conn, "a", &mut batch);
        add_crumb(&conn, "b", &mut batch);
        add_crumb(&conn, "outside", &mut batch);
        add_link(&conn, "l1", Link::BELONGS_TO, "a", "t");
        add_link(&conn, "l2", Link::BELONGS_TO, "b", "t");
        add_link(&conn, "l3", Link::BRANCHES_FROM, "t", "outside");

        assert_eq!(abandon_trail(&conn, "t", &mut batch).unwrap(), 2);
        assert_eq!(row::count::<Crumb>(&conn, &[]).unwrap(), 1);
        assert_eq!(row::count::<Link>(&conn, &[]).unwrap(), 0);
        assert_eq!(count_for(&conn, "a"), (0, 0, 0));
        assert_eq!(count_for(&conn, "outside").0, 5);
    }

    #[test]
    fn property_delete_cleans_up() {
        let conn = conn();
        let mut batch = MirrorBatch::new();
        add_crumb(&conn, "a", &mut batch);
        let size = property::define(
            &conn,
            Property {
                name: "size".into(),
                value_type: "categorical".into(),
                ..Default::default()
            },
            &["s", "m"],
            &mut batch,
        )
        .unwrap();
        row::upsert(
            &conn,
            &Metadata {
                id: "m1".into(),
                table_name: "comments".into(),
                crumb_id: "a".into(),
                property_id: Some(size.id.clone()),
                content: "about size".into(),
                created_at: time::now(),
            },
        )
        .unwrap();

        let mut batch = MirrorBatch::new();
        assert!(delete_property(&conn, &size.id, &mut batch).unwrap().is_some());
        assert_eq!(row::count::<Category>(&conn, &[]).unwrap(), 0);
        assert_eq!(row::count::<CrumbProperty>(&conn, &[]).unwrap(), 0);
        let note: Metadata = row::find(&conn, &["m1"]).unwrap().unwrap();
        assert_eq!(note.property_id, None);
    }

    #[test]
    fn category_delete_resets_values() {
        let conn = conn();
        let mut batch = MirrorBatch::new();
        add_crumb(&conn, "a", &mut batch);
        let size = property::define(
            &conn,
            Property {
                name: "size".into(),
                value_type: "categorical".into(),
                ..Default::default()
            },
            &["s", "m"],
            &mut batch,
        )
        .unwrap();
        let categories: Vec<Category> =
            row::select(&conn, &[Predicate::text("property_id", &size.id)]).unwrap();
        let small = categories.iter().find(|c| c.name == "s").unwrap();
        let medium = categories.iter().find(|c| c.name == "m").unwrap();
        let value: CrumbProperty = row::find(&conn, &["a", size.id.as_str()]).unwrap().unwrap();
        assert_eq!(value.value, json!(small.id));

        delete_category(&conn, &small.id, &mut batch).unwrap();
        let value: CrumbProperty = row::find(&conn, &["a", size.id.as_str()]).unwrap().unwrap();
        assert_eq!(value.value, json!(medium.id));
    }
}
