//! The relational cache.
//!
//! A SQLite database file created fresh on every attach and deleted on
//! detach. It answers structured queries; it is never the durable copy, so
//! it runs without a journal on disk and without `fsync`.

pub(crate) mod row;
pub(crate) mod schema;

use crate::error::CoreResult;
use rusqlite::{Connection, OpenFlags, Transaction};
use std::path::Path;
use tracing::debug;

pub(crate) use row::CacheRow;

/// An open cache database.
#[derive(Debug)]
pub(crate) struct Cache {
    conn: Connection,
}

impl Cache {
    /// Creates a new cache database at `path` and installs the schema.
    ///
    /// The file must not exist; stale caches are removed before this is
    /// called.
    pub(crate) fn create(path: &Path) -> CoreResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = MEMORY;
             PRAGMA synchronous = OFF;",
        )?;
        schema::install(&conn)?;
        debug!(path = %path.display(), "cache created");
        Ok(Self { conn })
    }

    /// Returns the connection for reads.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Starts a write transaction. Dropping it without commit rolls back.
    pub(crate) fn transaction(&mut self) -> CoreResult<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Closes the database.
    pub(crate) fn close(self) -> CoreResult<()> {
        self.conn.close().map_err(|(_, err)| err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{time, Crumb};
    use tempfile::TempDir;

    fn crumb(id: &str) -> Crumb {
        Crumb {
            id: id.into(),
            name: id.into(),
            state: "draft".into(),
            created_at: time::now(),
            updated_at: time::now(),
            ..Default::default()
        }
    }

    #[test]
    fn transaction_rolls_back_on_drop() {
        let dir = TempDir::new().unwrap();
        let mut cache = Cache::create(&dir.path().join("cache.db")).unwrap();

        {
            let tx = cache.transaction().unwrap();
            row::upsert(&tx, &crumb("a")).unwrap();
        }
        assert_eq!(row::count::<Crumb>(cache.conn(), &[]).unwrap(), 0);

        let tx = cache.transaction().unwrap();
        row::upsert(&tx, &crumb("a")).unwrap();
        tx.commit().unwrap();
        assert_eq!(row::count::<Crumb>(cache.conn(), &[]).unwrap(), 1);
    }

    #[test]
    fn foreign_keys_enforced() {
        let dir = TempDir::new().unwrap();
        let cache = Cache::create(&dir.path().join("cache.db")).unwrap();
        let result = cache.conn().execute(
            "INSERT INTO metadata (id, table_name, crumb_id, content, created_at) \
             VALUES ('m', 'comments', 'missing', 'x', 'now')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn close_releases_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        let cache = Cache::create(&path).unwrap();
        cache.close().unwrap();
        std::fs::remove_file(&path).unwrap();
    }
}
