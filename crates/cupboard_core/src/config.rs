//! Cupboard configuration.

use crate::error::{CoreError, CoreResult};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Cache backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Embedded SQLite file in the data directory.
    Sqlite,
}

impl Backend {
    /// Returns the selector string for this backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
        }
    }
}

impl FromStr for Backend {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(CoreError::BackendUnknown {
                backend: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a cache mutation is mirrored to its ledger.
///
/// There is no implicit choice here: every [`Config`] states one of the two
/// modes, and `Immediate` is what [`Config::new`] picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// The ledger write completes inside the call that changed the cache.
    ///
    /// A successful return means the change is on disk.
    #[default]
    Immediate,

    /// The ledger write is queued to a per-ledger background worker.
    ///
    /// Calls return once the cache is updated. Writes that have not run
    /// when the process dies are lost; the next attach rebuilds the cache
    /// without them. [`crate::Cupboard::flush`] and
    /// [`crate::Cupboard::detach`] wait for the queue to drain and report
    /// any write that failed.
    Deferred,
}

/// Configuration for attaching a cupboard.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Backend selector; only `"sqlite"` is recognized.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Directory holding the ledgers and the cache file.
    pub data_dir: PathBuf,

    /// Ledger mirroring mode.
    #[serde(default)]
    pub durability: Durability,

    /// Whether to create `data_dir` if it doesn't exist.
    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,
}

fn default_backend() -> String {
    Backend::Sqlite.as_str().to_string()
}

const fn default_create_if_missing() -> bool {
    true
}

impl Config {
    /// Creates a configuration for `data_dir` with default values.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: default_backend(),
            data_dir: data_dir.into(),
            durability: Durability::Immediate,
            create_if_missing: default_create_if_missing(),
        }
    }

    /// Sets the backend selector.
    #[must_use]
    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Sets the durability mode.
    #[must_use]
    pub const fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Sets whether to create the data directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Returns the data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Checks the configuration and resolves the backend.
    pub fn validate(&self) -> CoreResult<Backend> {
        let backend = self.backend.parse::<Backend>()?;
        if self.data_dir.as_os_str().is_empty() {
            return Err(CoreError::invalid_config("data_dir must not be empty"));
        }
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::new("/tmp/cupboard");
        assert_eq!(config.backend, "sqlite");
        assert_eq!(config.durability, Durability::Immediate);
        assert!(config.create_if_missing);
        assert_eq!(config.validate().unwrap(), Backend::Sqlite);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new("data")
            .durability(Durability::Deferred)
            .create_if_missing(false)
            .backend("SQLite");

        assert_eq!(config.durability, Durability::Deferred);
        assert!(!config.create_if_missing);
        assert_eq!(config.validate().unwrap(), Backend::Sqlite);
    }

    #[test]
    fn unknown_backend_rejected() {
        let err = Config::new("data").backend("dolt").validate().unwrap_err();
        assert!(matches!(err, CoreError::BackendUnknown { backend } if backend == "dolt"));
    }

    #[test]
    fn empty_data_dir_rejected() {
        let err = Config::new("").validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"data_dir": "/var/lib/cupboard", "durability": "deferred"}"#)
                .unwrap();
        assert_eq!(config.backend, "sqlite");
        assert_eq!(config.durability, Durability::Deferred);
        assert!(config.create_if_missing);
    }
}
