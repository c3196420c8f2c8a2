//! The entity-agnostic table router.
//!
//! [`Table`] exposes `get`, `set`, `delete` and `fetch` over [`Entity`]
//! values and dispatches on its [`TableName`] to the handler of one entity
//! type. Each handler validates its payload, changes the cache inside the
//! write transaction, runs any cascade, and records the ledger changes.

mod categories;
mod crumb_properties;
mod crumbs;
mod filter;
mod links;
mod metadata;
mod properties;
mod stash_history;
mod stashes;
mod trails;

pub use filter::Filter;

use crate::cache::row::{self, Predicate};
use crate::cache::CacheRow;
use crate::cupboard::Cupboard;
use crate::entity::{
    Category, Crumb, CrumbProperty, Entity, Link, Metadata, Property, Stash, StashHistory,
    TableName, Trail,
};
use crate::error::{CoreError, CoreResult};
use crate::mirror::MirrorBatch;
use rusqlite::Connection;

/// Per-entity behaviour behind the router.
pub(crate) trait TableHandler: CacheRow + Into<Entity> {
    /// Unwraps the router payload, or `None` if it is another entity type.
    fn from_entity(entity: Entity) -> Option<Self>;

    /// Reads one row by router id.
    fn get(conn: &Connection, id: &str) -> CoreResult<Option<Self>> {
        row::find(conn, &[id])
    }

    /// Reads every row matching `predicates`.
    fn fetch(conn: &Connection, predicates: &[Predicate]) -> CoreResult<Vec<Self>> {
        row::select(conn, predicates)
    }

    /// Creates (empty or unknown `id`) or updates the row and returns it
    /// as stored.
    fn set(conn: &Connection, id: &str, entity: Self, batch: &mut MirrorBatch) -> CoreResult<Self>;

    /// Deletes the row and its dependents. Returns false if it did not
    /// exist.
    fn delete(conn: &Connection, id: &str, batch: &mut MirrorBatch) -> CoreResult<bool> {
        let removed = row::delete::<Self>(conn, &[id])?;
        match removed {
            Some(removed) => {
                batch.remove(std::slice::from_ref(&removed));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Calls a generic function with the entity type of a table.
macro_rules! dispatch {
    ($name:expr, $method:ident ( $($arg:expr),* )) => {
        match $name {
            TableName::Crumbs => $method::<Crumb>($($arg),*),
            TableName::Trails => $method::<Trail>($($arg),*),
            TableName::Links => $method::<Link>($($arg),*),
            TableName::Properties => $method::<Property>($($arg),*),
            TableName::Categories => $method::<Category>($($arg),*),
            TableName::CrumbProperties => $method::<CrumbProperty>($($arg),*),
            TableName::Metadata => $method::<Metadata>($($arg),*),
            TableName::Stashes => $method::<Stash>($($arg),*),
            TableName::StashHistory => $method::<StashHistory>($($arg),*),
        }
    };
}

/// A handle on one table of an attached [`Cupboard`].
///
/// Every call checks that the cupboard is still attached and fails with
/// `CupboardDetached` otherwise.
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    cupboard: &'a Cupboard,
    name: TableName,
}

impl<'a> Table<'a> {
    pub(crate) fn new(cupboard: &'a Cupboard, name: TableName) -> Self {
        Self { cupboard, name }
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> TableName {
        self.name
    }

    /// Reads the entity with router id `id`.
    ///
    /// # Errors
    ///
    /// `InvalidId` for an empty id, `NotFound` if no such entity exists.
    pub fn get(&self, id: &str) -> CoreResult<Entity> {
        if id.is_empty() {
            return Err(CoreError::invalid_id(id));
        }
        let found = self.cupboard.read(|conn| dispatch!(self.name, get_entity(conn, id)))?;
        found.ok_or_else(|| CoreError::not_found(self.name.as_str(), id))
    }

    /// Creates or updates an entity and returns its router id.
    ///
    /// An empty `id` creates the entity under a new id. A non-empty `id`
    /// updates that entity, or creates it under that id if it does not
    /// exist. The `id` field of the payload is ignored.
    ///
    /// # Errors
    ///
    /// `InvalidData` if `entity` belongs to another table, plus the
    /// validation and conflict errors of the entity type.
    pub fn set(&self, id: &str, entity: impl Into<Entity>) -> CoreResult<String> {
        let entity = entity.into();
        if entity.table() != self.name {
            return Err(CoreError::invalid_data(format!(
                "{} entity cannot be stored in table {}",
                entity.table(),
                self.name
            )));
        }
        self.cupboard
            .write(|conn, batch| dispatch!(self.name, set_entity(conn, id, entity, batch)))
    }

    /// Deletes the entity with router id `id` and everything that depends
    /// on it.
    ///
    /// # Errors
    ///
    /// `InvalidId` for an empty id, `NotFound` if no such entity exists.
    pub fn delete(&self, id: &str) -> CoreResult<()> {
        if id.is_empty() {
            return Err(CoreError::invalid_id(id));
        }
        let deleted = self
            .cupboard
            .write(|conn, batch| dispatch!(self.name, delete_entity(conn, id, batch)))?;
        if deleted {
            Ok(())
        } else {
            Err(CoreError::not_found(self.name.as_str(), id))
        }
    }

    /// Returns every entity matching `filter`, ordered by id. An empty
    /// filter matches everything.
    ///
    /// # Errors
    ///
    /// `InvalidFilter` for unknown fields or unsupported values.
    pub fn fetch(&self, filter: &Filter) -> CoreResult<Vec<Entity>> {
        self.cupboard
            .read(|conn| dispatch!(self.name, fetch_entities(conn, filter)))
    }
}

fn get_entity<T: TableHandler>(conn: &Connection, id: &str) -> CoreResult<Option<Entity>> {
    Ok(T::get(conn, id)?.map(Into::into))
}

fn set_entity<T: TableHandler>(
    conn: &Connection,
    id: &str,
    entity: Entity,
    batch: &mut MirrorBatch,
) -> CoreResult<String> {
    let payload = T::from_entity(entity).ok_or_else(|| {
        CoreError::invalid_data(format!("payload is not a {} entity", T::TABLE))
    })?;
    let stored: Entity = T::set(conn, id, payload, batch)?.into();
    Ok(stored.id())
}

fn delete_entity<T: TableHandler>(conn: &Connection, id: &str, batch: &mut MirrorBatch) -> CoreResult<bool> {
    T::delete(conn, id, batch)
}

fn fetch_entities<T: TableHandler>(conn: &Connection, filter: &Filter) -> CoreResult<Vec<Entity>> {
    let predicates = filter.predicates::<T>()?;
    Ok(T::fetch(conn, &predicates)?.into_iter().map(Into::into).collect())
}

/// Returns `id`, or a fresh id when it is empty.
pub(crate) fn id_or_new(id: &str) -> String {
    if id.is_empty() {
        crate::entity::new_id()
    } else {
        id.to_string()
    }
}

/// Finds the existing row for an update, if `id` names one.
pub(crate) fn existing<T: CacheRow>(conn: &Connection, id: &str) -> CoreResult<Option<T>> {
    if id.is_empty() {
        Ok(None)
    } else {
        row::find(conn, &[id])
    }
}
