//! The engine facade.

use crate::cache::Cache;
use crate::config::Config;
use crate::dir::DataDir;
use crate::entity::TableName;
use crate::error::{CoreError, CoreResult};
use crate::loader;
use crate::mirror::{LedgerSet, Mirror, MirrorBatch};
use crate::property;
use crate::table::Table;
use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use std::path::PathBuf;
use tracing::{info, warn};

/// State that exists only while attached.
struct Attached {
    config: Config,
    dir: DataDir,
    /// The SQLite connection is `Send` but not `Sync`; readers holding the
    /// shared engine lock take turns on it.
    cache: Mutex<Cache>,
    mirror: Mirror,
}

/// An embedded task store over a data directory.
///
/// `Cupboard` holds no data until [`attach`](Cupboard::attach)ed. While
/// attached, the ledgers in the data directory are the durable copy and a
/// SQLite cache rebuilt from them answers every read.
///
/// # Thread Safety
///
/// `Cupboard` is `Send + Sync`. Reads share a reader/writer lock over the
/// whole engine; writes, `attach` and `detach` take it exclusively.
///
/// # Example
///
/// ```rust,no_run
/// use cupboard_core::{Config, Crumb, Cupboard, Filter};
///
/// let cupboard = Cupboard::new();
/// cupboard.attach(Config::new("my_cupboard"))?;
///
/// let crumbs = cupboard.table("crumbs")?;
/// let id = crumbs.set("", Crumb { name: "Implement X".into(), ..Default::default() })?;
/// let drafts = crumbs.fetch(&Filter::new().with("state", "draft"))?;
/// assert_eq!(drafts.len(), 1);
/// # let _ = id;
///
/// cupboard.detach()?;
/// # Ok::<(), cupboard_core::CoreError>(())
/// ```
pub struct Cupboard {
    state: RwLock<Option<Attached>>,
}

impl Cupboard {
    /// Creates a detached cupboard.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    /// Attaches to the data directory named by `config`.
    ///
    /// Creates the directory and any missing ledger, discards a stale cache
    /// left by a crash, builds a fresh cache from the ledgers in one
    /// transaction, and defines the built-in properties. On error nothing
    /// stays attached.
    ///
    /// # Errors
    ///
    /// - `AlreadyAttached` if this cupboard is attached
    /// - `BackendUnknown` or `InvalidConfig` for a bad configuration
    /// - `DirectoryLocked` if another cupboard holds the directory
    /// - I/O, ledger and cache errors
    pub fn attach(&self, config: Config) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.is_some() {
            return Err(CoreError::AlreadyAttached);
        }
        config.validate()?;

        let dir = DataDir::open(config.data_dir(), config.create_if_missing)?;
        let ledgers = LedgerSet::open(&dir)?;
        dir.remove_cache_files()?;
        let mut cache = Cache::create(&dir.cache_path())?;

        let mut batch = MirrorBatch::new();
        let stats = {
            let tx = cache.transaction()?;
            let stats = loader::load_all(&tx, &ledgers)?;
            property::seed_builtins(&tx, &mut batch)?;
            property::repair(&tx, &mut batch)?;
            tx.commit()?;
            stats
        };

        // Seeding and repair are written synchronously in every mode, so
        // attach fails if the ledgers cannot take them.
        ledgers.apply(batch)?;
        let mirror = Mirror::new(ledgers, config.durability)?;

        info!(
            path = %dir.path().display(),
            durability = ?config.durability,
            loaded = stats.loaded,
            skipped = stats.skipped,
            "cupboard attached"
        );
        *state = Some(Attached {
            config,
            dir,
            cache: Mutex::new(cache),
            mirror,
        });
        Ok(())
    }

    /// Detaches, flushing queued ledger writes and deleting the cache.
    ///
    /// Does nothing when already detached. The cupboard is detached
    /// afterwards even when an error is returned.
    pub fn detach(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        let Some(attached) = state.take() else {
            return Ok(());
        };
        let Attached {
            config: _,
            dir,
            cache,
            mirror,
        } = attached;

        let flushed = mirror.shutdown();
        let closed = cache.into_inner().close();
        let removed = dir.remove_cache_files();
        info!(path = %dir.path().display(), "cupboard detached");
        drop(dir);

        if let Err(err) = &flushed {
            warn!(error = %err, "ledger writes failed before detach");
        }
        flushed.and(closed).and(removed)
    }

    /// Returns true while attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state.read().is_some()
    }

    /// Returns the attached data directory.
    pub fn data_dir(&self) -> CoreResult<PathBuf> {
        let state = self.state.read();
        let attached = state.as_ref().ok_or(CoreError::CupboardDetached)?;
        Ok(attached.dir.path().to_path_buf())
    }

    /// Returns the configuration the cupboard was attached with.
    pub fn config(&self) -> CoreResult<Config> {
        let state = self.state.read();
        let attached = state.as_ref().ok_or(CoreError::CupboardDetached)?;
        Ok(attached.config.clone())
    }

    /// Returns a handle on the table called `name`.
    ///
    /// Accepts the canonical names (`crumbs`, `trails`, ...) and the
    /// aliases `items`, `sessions`, `attribute_types`, `attribute_values`
    /// and `annotations`.
    ///
    /// # Errors
    ///
    /// `CupboardDetached` when detached, `TableNotFound` for any other name.
    pub fn table(&self, name: &str) -> CoreResult<Table<'_>> {
        if !self.is_attached() {
            return Err(CoreError::CupboardDetached);
        }
        let name = name.parse::<TableName>()?;
        Ok(Table::new(self, name))
    }

    /// Waits until every queued ledger write has run.
    ///
    /// Returns the first deferred write failure since the previous flush.
    /// A no-op in immediate mode.
    pub fn flush(&self) -> CoreResult<()> {
        let state = self.state.read();
        let attached = state.as_ref().ok_or(CoreError::CupboardDetached)?;
        attached.mirror.flush()
    }

    /// Runs `f` against the cache under the shared lock.
    pub(crate) fn read<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Connection) -> CoreResult<T>,
    {
        let state = self.state.read();
        let attached = state.as_ref().ok_or(CoreError::CupboardDetached)?;
        let cache = attached.cache.lock();
        f(cache.conn())
    }

    /// Runs `f` in a cache transaction under the exclusive lock.
    ///
    /// If `f` returns `Ok` the transaction commits and the ledger changes
    /// it recorded are mirrored. If it returns `Err` the transaction rolls
    /// back and no ledger is touched.
    pub(crate) fn write<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Connection, &mut MirrorBatch) -> CoreResult<T>,
    {
        let mut state = self.state.write();
        let attached = state.as_mut().ok_or(CoreError::CupboardDetached)?;
        let mut batch = MirrorBatch::new();
        let value = {
            let tx = attached.cache.get_mut().transaction()?;
            let value = f(&tx, &mut batch)?;
            tx.commit()?;
            value
        };
        if !batch.is_empty() {
            attached.mirror.apply(batch)?;
        }
        Ok(value)
    }
}

impl Default for Cupboard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cupboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Cupboard")
            .field("attached", &state.is_some())
            .field("data_dir", &state.as_ref().map(|a| a.dir.path().to_path_buf()))
            .finish_non_exhaustive()
    }
}

impl Drop for Cupboard {
    fn drop(&mut self) {
        let _ = self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Durability;
    use tempfile::TempDir;

    #[test]
    fn attach_creates_ledgers_and_cache() {
        let tmp = TempDir::new().unwrap();
        let cupboard = Cupboard::new();
        cupboard.attach(Config::new(tmp.path())).unwrap();

        for table in TableName::ALL {
            assert!(tmp.path().join(table.ledger_file()).is_file(), "{table}");
        }
        assert!(tmp.path().join("cupboard.db").is_file());
        assert_eq!(cupboard.data_dir().unwrap(), tmp.path());

        cupboard.detach().unwrap();
        assert!(!tmp.path().join("cupboard.db").exists());
        assert!(tmp.path().join("crumbs.jsonl").is_file());
    }

    #[test]
    fn double_attach_fails() {
        let tmp = TempDir::new().unwrap();
        let cupboard = Cupboard::new();
        cupboard.attach(Config::new(tmp.path())).unwrap();
        assert!(matches!(
            cupboard.attach(Config::new(tmp.path())),
            Err(CoreError::AlreadyAttached)
        ));
        assert!(cupboard.is_attached());
    }

    #[test]
    fn detached_operations_fail() {
        let cupboard = Cupboard::new();
        assert!(matches!(cupboard.table("crumbs"), Err(CoreError::CupboardDetached)));
        assert!(matches!(cupboard.flush(), Err(CoreError::CupboardDetached)));
        assert!(matches!(cupboard.data_dir(), Err(CoreError::CupboardDetached)));
        cupboard.detach().unwrap();
        cupboard.detach().unwrap();
    }

    #[test]
    fn bad_config_leaves_detached() {
        let tmp = TempDir::new().unwrap();
        let cupboard = Cupboard::new();
        assert!(matches!(
            cupboard.attach(Config::new(tmp.path()).backend("postgres")),
            Err(CoreError::BackendUnknown { .. })
        ));
        assert!(!cupboard.is_attached());

        let missing = tmp.path().join("missing");
        assert!(matches!(
            cupboard.attach(Config::new(&missing).create_if_missing(false)),
            Err(CoreError::InvalidConfig { .. })
        ));
        assert!(!cupboard.is_attached());
    }

    #[test]
    fn second_cupboard_is_locked_out() {
        let tmp = TempDir::new().unwrap();
        let first = Cupboard::new();
        first.attach(Config::new(tmp.path())).unwrap();

        let second = Cupboard::new();
        assert!(matches!(
            second.attach(Config::new(tmp.path())),
            Err(CoreError::DirectoryLocked)
        ));

        first.detach().unwrap();
        second.attach(Config::new(tmp.path())).unwrap();
    }

    #[test]
    fn write_error_after_cascade_rolls_everything_back() {
        use crate::cascade;
        use crate::entity::{Crumb, Link, Trail};
        use crate::table::Filter;

        let tmp = TempDir::new().unwrap();
        let cupboard = Cupboard::new();
        cupboard.attach(Config::new(tmp.path())).unwrap();
        let trail = cupboard.table("trails").unwrap().set("", Trail::default()).unwrap();
        let crumb = cupboard
            .table("crumbs")
            .unwrap()
            .set("", Crumb { name: "member".into(), ..Default::default() })
            .unwrap();
        cupboard
            .table("links")
            .unwrap()
            .set(
                "",
                Link {
                    link_type: Link::BELONGS_TO.into(),
                    from_id: crumb.clone(),
                    to_id: trail.clone(),
                    ..Default::default()
                },
            )
            .unwrap();
        let ledger = |name: &str| std::fs::read_to_string(tmp.path().join(name)).unwrap();
        let before = [ledger("crumbs.jsonl"), ledger("links.jsonl"), ledger("crumb_properties.jsonl")];

        let result: CoreResult<()> = cupboard.write(|conn, batch| {
            let deleted = cascade::abandon_trail(conn, &trail, batch)?;
            assert_eq!(deleted, 1);
            Err(CoreError::invalid_data("late failure"))
        });
        assert!(matches!(result, Err(CoreError::InvalidData { .. })));

        assert!(cupboard.table("crumbs").unwrap().get(&crumb).is_ok());
        let links = cupboard.table("links").unwrap().fetch(&Filter::new()).unwrap();
        assert_eq!(links.len(), 1);
        let values = cupboard
            .table("crumb_properties")
            .unwrap()
            .fetch(&Filter::new().with("crumb_id", crumb.as_str()))
            .unwrap();
        assert_eq!(values.len(), 5);
        assert_eq!(
            [ledger("crumbs.jsonl"), ledger("links.jsonl"), ledger("crumb_properties.jsonl")],
            before
        );
    }

    #[test]
    fn stale_cache_is_replaced() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("cupboard.db"), b"not a database").unwrap();
        let cupboard = Cupboard::new();
        cupboard
            .attach(Config::new(tmp.path()).durability(Durability::Deferred))
            .unwrap();
        assert!(cupboard.table("properties").unwrap().fetch(&Default::default()).unwrap().len() >= 5);
    }
}
