use super::{existing, TableHandler};
use crate::cache::row;
use crate::cascade;
use crate::entity::{Entity, Property};
use crate::error::{CoreError, CoreResult};
use crate::mirror::MirrorBatch;
use crate::property;
use rusqlite::Connection;

impl TableHandler for Property {
    fn from_entity(entity: Entity) -> Option<Self> {
        entity.into_property()
    }

    fn set(conn: &Connection, id: &str, mut definition: Self, batch: &mut MirrorBatch) -> CoreResult<Self> {
        let Some(previous) = existing::<Property>(conn, id)? else {
            definition.id = id.to_string();
            return property::define(conn, definition, &[], batch);
        };

        if definition.name.trim().is_empty() {
            return Err(CoreError::invalid_name("property name must not be empty"));
        }
        if definition.value_type != previous.value_type {
            return Err(CoreError::invalid_data(format!(
                "value_type of property {} cannot change from {} to {}",
                previous.name, previous.value_type, definition.value_type
            )));
        }
        definition.id = previous.id;
        definition.created_at = previous.created_at;
        property::check_unique_name(conn, &definition)?;

        row::upsert(conn, &definition)?;
        batch.upsert(&definition)?;
        Ok(definition)
    }

    fn delete(conn: &Connection, id: &str, batch: &mut MirrorBatch) -> CoreResult<bool> {
        Ok(cascade::delete_property(conn, id, batch)?.is_some())
    }
}
