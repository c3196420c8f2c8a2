use super::TableHandler;
use crate::cache::row;
use crate::entity::{split_crumb_property_id, Crumb, CrumbProperty, Entity, Property};
use crate::error::{CoreError, CoreResult};
use crate::mirror::MirrorBatch;
use crate::property;
use rusqlite::Connection;

fn split(id: &str) -> CoreResult<(&str, &str)> {
    split_crumb_property_id(id).ok_or_else(|| CoreError::invalid_id(id))
}

/// Property values are addressed by `"<crumb_id>:<property_id>"`. They
/// come and go with their crumb and property, so `delete` is refused.
impl TableHandler for CrumbProperty {
    fn from_entity(entity: Entity) -> Option<Self> {
        entity.into_crumb_property()
    }

    fn get(conn: &Connection, id: &str) -> CoreResult<Option<Self>> {
        let (crumb_id, property_id) = split(id)?;
        row::find(conn, &[crumb_id, property_id])
    }

    fn set(conn: &Connection, id: &str, mut value: Self, batch: &mut MirrorBatch) -> CoreResult<Self> {
        if !id.is_empty() {
            let (crumb_id, property_id) = split(id)?;
            value.crumb_id = crumb_id.to_string();
            value.property_id = property_id.to_string();
        }
        if row::find::<Crumb>(conn, &[value.crumb_id.as_str()])?.is_none() {
            return Err(CoreError::invalid_data(format!("no crumb with id {}", value.crumb_id)));
        }
        let Some(definition) = row::find::<Property>(conn, &[value.property_id.as_str()])? else {
            return Err(CoreError::invalid_data(format!(
                "no property with id {}",
                value.property_id
            )));
        };
        property::validate_value(conn, &definition, &value.value)?;
        value.value_type = definition.value_type;

        row::upsert(conn, &value)?;
        batch.upsert(&value)?;
        Ok(value)
    }

    fn delete(_conn: &Connection, id: &str, _batch: &mut MirrorBatch) -> CoreResult<bool> {
        split(id)?;
        Err(CoreError::invalid_data(
            "property values are removed with their crumb or property",
        ))
    }
}
