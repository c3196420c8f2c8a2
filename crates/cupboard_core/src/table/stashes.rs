use super::{existing, id_or_new, TableHandler};
use crate::cache::row::{self, Predicate};
use crate::entity::{new_id, time, Entity, Stash, StashHistory};
use crate::error::{CoreError, CoreResult};
use crate::mirror::MirrorBatch;
use rusqlite::Connection;

const CREATE: &str = "create";
const SET: &str = "set";
const DELETE: &str = "delete";

fn next_version(stash: &Stash) -> CoreResult<i64> {
    stash.version.checked_add(1).ok_or_else(|| {
        CoreError::invalid_data(format!("stash {} is at its last version", stash.name))
    })
}

/// Appends one audit entry for `stash`.
fn record(conn: &Connection, stash: &Stash, operation: &str, batch: &mut MirrorBatch) -> CoreResult<()> {
    let entry = StashHistory {
        id: new_id(),
        stash_id: stash.id.clone(),
        version: stash.version,
        value: stash.value.clone(),
        operation: operation.to_string(),
        changed_by: None,
        created_at: stash.updated_at,
    };
    row::upsert(conn, &entry)?;
    batch.append(&entry)
}

/// Every change bumps the version and appends to `stash_history`.
impl TableHandler for Stash {
    fn from_entity(entity: Entity) -> Option<Self> {
        entity.into_stash()
    }

    fn set(conn: &Connection, id: &str, mut stash: Self, batch: &mut MirrorBatch) -> CoreResult<Self> {
        if stash.name.trim().is_empty() {
            return Err(CoreError::invalid_name("stash name must not be empty"));
        }
        let previous = existing::<Stash>(conn, id)?;
        stash.id = id_or_new(id);

        let same_name: Vec<Stash> = row::select(conn, &[Predicate::text("name", &stash.name)])?;
        if same_name.iter().any(|other| other.id != stash.id) {
            return Err(CoreError::duplicate_name("stashes", &stash.name));
        }

        let now = time::now();
        stash.updated_at = now;
        let operation = match &previous {
            Some(previous) => {
                stash.version = next_version(previous)?;
                stash.created_at = previous.created_at;
                SET
            }
            None => {
                stash.version = 1;
                stash.created_at = now;
                CREATE
            }
        };

        row::upsert(conn, &stash)?;
        batch.upsert(&stash)?;
        record(conn, &stash, operation, batch)?;
        Ok(stash)
    }

    fn delete(conn: &Connection, id: &str, batch: &mut MirrorBatch) -> CoreResult<bool> {
        let Some(mut stash) = row::delete::<Stash>(conn, &[id])? else {
            return Ok(false);
        };
        batch.remove(std::slice::from_ref(&stash));
        stash.version = next_version(&stash)?;
        stash.updated_at = time::now();
        record(conn, &stash, DELETE, batch)?;
        Ok(true)
    }
}
