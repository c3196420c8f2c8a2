use super::{existing, id_or_new, TableHandler};
use crate::cache::row::{self, Predicate};
use crate::entity::{time, Entity, Link};
use crate::error::{CoreError, CoreResult};
use crate::mirror::MirrorBatch;
use rusqlite::Connection;

impl TableHandler for Link {
    fn from_entity(entity: Entity) -> Option<Self> {
        entity.into_link()
    }

    fn set(conn: &Connection, id: &str, mut link: Self, batch: &mut MirrorBatch) -> CoreResult<Self> {
        if link.link_type.is_empty() || link.from_id.is_empty() || link.to_id.is_empty() {
            return Err(CoreError::invalid_data(
                "link needs a link_type, a from_id and a to_id",
            ));
        }
        let previous = existing::<Link>(conn, id)?;
        link.id = id_or_new(id);

        let same: Vec<Link> = row::select(
            conn,
            &[
                Predicate::text("link_type", &link.link_type),
                Predicate::text("from_id", &link.from_id),
                Predicate::text("to_id", &link.to_id),
            ],
        )?;
        if same.iter().any(|other| other.id != link.id) {
            return Err(CoreError::DuplicateLink {
                link_type: link.link_type,
                from_id: link.from_id,
                to_id: link.to_id,
            });
        }

        link.created_at = previous.as_ref().map_or_else(time::now, |p| p.created_at);
        row::upsert(conn, &link)?;
        batch.upsert(&link)?;
        Ok(link)
    }
}
