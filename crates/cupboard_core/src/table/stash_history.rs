use super::{id_or_new, TableHandler};
use crate::cache::row;
use crate::entity::{time, Entity, StashHistory};
use crate::error::{CoreError, CoreResult};
use crate::mirror::MirrorBatch;
use rusqlite::Connection;

fn append_only() -> CoreError {
    CoreError::AppendOnly {
        table: "stash_history",
    }
}

/// The audit trail only grows: new entries are appended to the ledger and
/// existing ones are never rewritten.
impl TableHandler for StashHistory {
    fn from_entity(entity: Entity) -> Option<Self> {
        entity.into_stash_history()
    }

    fn set(conn: &Connection, id: &str, mut entry: Self, batch: &mut MirrorBatch) -> CoreResult<Self> {
        if !id.is_empty() && row::find::<StashHistory>(conn, &[id])?.is_some() {
            return Err(append_only());
        }
        if entry.stash_id.is_empty() {
            return Err(CoreError::invalid_data("stash history needs a stash_id"));
        }
        entry.id = id_or_new(id);
        entry.created_at = time::now();
        row::upsert(conn, &entry)?;
        batch.append(&entry)?;
        Ok(entry)
    }

    fn delete(_conn: &Connection, _id: &str, _batch: &mut MirrorBatch) -> CoreResult<bool> {
        Err(append_only())
    }
}
