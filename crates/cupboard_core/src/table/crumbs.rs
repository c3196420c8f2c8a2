use super::{existing, id_or_new, TableHandler};
use crate::cache::row::{self, Predicate};
use crate::cascade;
use crate::entity::{time, Crumb, CrumbProperty, Entity, Property};
use crate::error::{CoreError, CoreResult};
use crate::mirror::MirrorBatch;
use crate::property;
use rusqlite::Connection;

impl TableHandler for Crumb {
    fn from_entity(entity: Entity) -> Option<Self> {
        entity.into_crumb()
    }

    fn get(conn: &Connection, id: &str) -> CoreResult<Option<Self>> {
        let Some(mut crumb) = row::find::<Crumb>(conn, &[id])? else {
            return Ok(None);
        };
        property::attach_values(conn, &mut crumb)?;
        Ok(Some(crumb))
    }

    fn fetch(conn: &Connection, predicates: &[Predicate]) -> CoreResult<Vec<Self>> {
        let mut crumbs: Vec<Crumb> = row::select(conn, predicates)?;
        for crumb in &mut crumbs {
            property::attach_values(conn, crumb)?;
        }
        Ok(crumbs)
    }

    fn set(conn: &Connection, id: &str, mut crumb: Self, batch: &mut MirrorBatch) -> CoreResult<Self> {
        if crumb.name.trim().is_empty() {
            return Err(CoreError::invalid_name("crumb name must not be empty"));
        }
        let supplied = std::mem::take(&mut crumb.properties);

        let previous = existing::<Crumb>(conn, id)?;
        if crumb.state.is_empty() {
            crumb.state = previous
                .as_ref()
                .map_or_else(|| Crumb::DRAFT.to_string(), |p| p.state.clone());
        }
        let now = time::now();
        crumb.id = id_or_new(id);
        crumb.created_at = previous.as_ref().map_or(now, |p| p.created_at);
        crumb.updated_at = now;
        row::upsert(conn, &crumb)?;
        batch.upsert(&crumb)?;

        if previous.is_none() {
            property::init_crumb(conn, &crumb.id, batch)?;
        }
        for (property_id, value) in supplied {
            let Some(definition) = row::find::<Property>(conn, &[property_id.as_str()])? else {
                return Err(CoreError::invalid_data(format!("no property with id {property_id}")));
            };
            property::validate_value(conn, &definition, &value)?;
            let value = CrumbProperty {
                crumb_id: crumb.id.clone(),
                property_id,
                value_type: definition.value_type,
                value,
            };
            row::upsert(conn, &value)?;
            batch.upsert(&value)?;
        }

        property::attach_values(conn, &mut crumb)?;
        Ok(crumb)
    }

    fn delete(conn: &Connection, id: &str, batch: &mut MirrorBatch) -> CoreResult<bool> {
        Ok(cascade::delete_crumb(conn, id, batch)?.is_some())
    }
}
