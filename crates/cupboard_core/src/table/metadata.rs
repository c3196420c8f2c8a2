use super::{existing, id_or_new, TableHandler};
use crate::cache::row;
use crate::entity::{time, Crumb, Entity, Metadata, Property};
use crate::error::{CoreError, CoreResult};
use crate::mirror::MirrorBatch;
use rusqlite::Connection;

impl TableHandler for Metadata {
    fn from_entity(entity: Entity) -> Option<Self> {
        entity.into_metadata()
    }

    fn set(conn: &Connection, id: &str, mut note: Self, batch: &mut MirrorBatch) -> CoreResult<Self> {
        if note.table_name.is_empty() {
            return Err(CoreError::invalid_data("metadata needs a table_name"));
        }
        if row::find::<Crumb>(conn, &[note.crumb_id.as_str()])?.is_none() {
            return Err(CoreError::invalid_data(format!("no crumb with id {}", note.crumb_id)));
        }
        note.property_id = note.property_id.filter(|id| !id.is_empty());
        if let Some(property_id) = &note.property_id {
            if row::find::<Property>(conn, &[property_id.as_str()])?.is_none() {
                return Err(CoreError::invalid_data(format!("no property with id {property_id}")));
            }
        }

        let previous = existing::<Metadata>(conn, id)?;
        note.id = id_or_new(id);
        note.created_at = previous.as_ref().map_or_else(time::now, |p| p.created_at);
        row::upsert(conn, &note)?;
        batch.upsert(&note)?;
        Ok(note)
    }
}
