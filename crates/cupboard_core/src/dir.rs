//! Data directory management.
//!
//! This module handles the file system layout for a cupboard:
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK                    # Advisory lock, held while attached
//! ├─ cupboard.db             # Relational cache, rebuilt on every attach
//! └─ <table>.jsonl           # One ledger per entity type
//! ```
//!
//! The ledgers are the only files that carry data across a clean detach.

use crate::entity::TableName;
use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const CACHE_FILE: &str = "cupboard.db";
/// Files SQLite may leave next to the cache.
const CACHE_SIDE_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// An opened data directory.
///
/// Holds an exclusive advisory lock on `LOCK` for as long as it lives, so
/// two cupboards never attach the same directory at once.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens or creates a data directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path exists but is not a directory
    /// - Another cupboard holds the lock (`DirectoryLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_config(format!(
                    "data directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_config(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DirectoryLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the data directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the cache file.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.path.join(CACHE_FILE)
    }

    /// Returns the path to the ledger for `table`.
    #[must_use]
    pub fn ledger_path(&self, table: TableName) -> PathBuf {
        self.path.join(table.ledger_file())
    }

    /// Deletes the cache file and its SQLite side files, if present.
    ///
    /// Used both for stale caches left by a crash and on clean detach.
    pub fn remove_cache_files(&self) -> CoreResult<()> {
        let cache = self.cache_path();
        let mut targets = vec![cache.clone()];
        for suffix in CACHE_SIDE_SUFFIXES {
            let mut name = cache.clone().into_os_string();
            name.push(suffix);
            targets.push(PathBuf::from(name));
        }

        for target in targets {
            match fs::remove_file(&target) {
                Ok(()) => debug!(path = %target.display(), "removed cache file"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let data_path = temp.path().join("new_cupboard");

        let dir = DataDir::open(&data_path, true).unwrap();
        assert!(data_path.is_dir());
        assert!(data_path.join(LOCK_FILE).exists());
        assert_eq!(dir.path(), data_path);
    }

    #[test]
    fn open_fails_if_not_exists_and_no_create() {
        let temp = tempdir().unwrap();
        let result = DataDir::open(&temp.path().join("missing"), false);
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn open_fails_on_regular_file() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            DataDir::open(&file, true),
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let _dir = DataDir::open(temp.path(), true).unwrap();
        assert!(matches!(
            DataDir::open(temp.path(), true),
            Err(CoreError::DirectoryLocked)
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let _dir = DataDir::open(temp.path(), true).unwrap();
        }
        let _again = DataDir::open(temp.path(), true).unwrap();
    }

    #[test]
    fn remove_cache_files_clears_side_files() {
        let temp = tempdir().unwrap();
        let dir = DataDir::open(temp.path(), true).unwrap();
        fs::write(dir.cache_path(), b"stale").unwrap();
        fs::write(temp.path().join("cupboard.db-journal"), b"stale").unwrap();

        dir.remove_cache_files().unwrap();
        assert!(!dir.cache_path().exists());
        assert!(!temp.path().join("cupboard.db-journal").exists());

        // Nothing left to remove is fine.
        dir.remove_cache_files().unwrap();
    }

    #[test]
    fn ledger_paths_follow_table_names() {
        let temp = tempdir().unwrap();
        let dir = DataDir::open(temp.path(), true).unwrap();
        assert_eq!(
            dir.ledger_path(TableName::CrumbProperties),
            temp.path().join("crumb_properties.jsonl")
        );
    }
}
