use super::{existing, id_or_new, TableHandler};
use crate::cache::row;
use crate::cascade;
use crate::entity::{time, Entity, Trail};
use crate::error::CoreResult;
use crate::mirror::MirrorBatch;
use rusqlite::Connection;
use tracing::debug;

impl TableHandler for Trail {
    fn from_entity(entity: Entity) -> Option<Self> {
        entity.into_trail()
    }

    /// State changes cascade only when the stored state differs.
    fn set(conn: &Connection, id: &str, mut trail: Self, batch: &mut MirrorBatch) -> CoreResult<Self> {
        if trail.state.is_empty() {
            trail.state = Trail::ACTIVE.to_string();
        }
        let previous = existing::<Trail>(conn, id)?;
        trail.id = id_or_new(id);
        trail.created_at = previous.as_ref().map_or_else(time::now, |p| p.created_at);
        let ended = trail.state == Trail::COMPLETED || trail.state == Trail::ABANDONED;
        if ended && trail.completed_at.is_none() {
            trail.completed_at = previous
                .as_ref()
                .and_then(|p| p.completed_at)
                .or_else(|| Some(time::now()));
        }

        if let Some(previous) = &previous {
            if previous.state != trail.state {
                debug!(trail = %trail.id, from = %previous.state, to = %trail.state, "trail state changed");
                match trail.state.as_str() {
                    Trail::COMPLETED => {
                        cascade::complete_trail(conn, &trail.id, batch)?;
                    }
                    Trail::ABANDONED => {
                        cascade::abandon_trail(conn, &trail.id, batch)?;
                    }
                    _ => {}
                }
            }
        }

        row::upsert(conn, &trail)?;
        batch.upsert(&trail)?;
        Ok(trail)
    }

    fn delete(conn: &Connection, id: &str, batch: &mut MirrorBatch) -> CoreResult<bool> {
        let Some(trail) = row::delete::<Trail>(conn, &[id])? else {
            return Ok(false);
        };
        cascade::delete_links_touching(conn, id, batch)?;
        batch.remove(&[trail]);
        Ok(true)
    }
}
