//! Error types for Cupboard core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Cupboard core operations.
///
/// Validation, not-found, state and conflict errors are returned before any
/// durable change is made. `Ledger` errors raised after a successful cache
/// commit mean the change is visible for the rest of the process lifetime
/// but not durable: the next attach rebuilds the cache from the ledgers and
/// the change is gone.
#[derive(Debug, Error)]
pub enum CoreError {
    /// `attach` was called on an already attached cupboard.
    #[error("cupboard is already attached")]
    AlreadyAttached,

    /// The operation requires an attached cupboard.
    #[error("cupboard is detached")]
    CupboardDetached,

    /// The configured backend is not recognized.
    #[error("unknown backend: {backend}")]
    BackendUnknown {
        /// The rejected backend selector.
        backend: String,
    },

    /// The configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Another cupboard holds the data directory.
    #[error("data directory locked: another cupboard is attached")]
    DirectoryLocked,

    /// No table has the requested name.
    #[error("table not found: {name}")]
    TableNotFound {
        /// The requested table name.
        name: String,
    },

    /// The id is empty or malformed.
    #[error("invalid id: {id:?}")]
    InvalidId {
        /// The rejected id.
        id: String,
    },

    /// No row has the requested id.
    #[error("not found: {id} in {table}")]
    NotFound {
        /// Table that was searched.
        table: &'static str,
        /// The missing id.
        id: String,
    },

    /// The payload does not fit the table or violates a data rule.
    #[error("invalid data: {message}")]
    InvalidData {
        /// Description of the problem.
        message: String,
    },

    /// A filter names an unknown field or uses an unsupported value.
    #[error("invalid filter: {message}")]
    InvalidFilter {
        /// Description of the problem.
        message: String,
    },

    /// A required name is empty.
    #[error("invalid name: {message}")]
    InvalidName {
        /// Description of the problem.
        message: String,
    },

    /// A property value type is not one of the recognized types.
    #[error("invalid value type: {value_type:?}")]
    InvalidValueType {
        /// The rejected value type.
        value_type: String,
    },

    /// A name that must be unique is already taken.
    #[error("duplicate name {name:?} in {table}")]
    DuplicateName {
        /// Table holding the conflicting row.
        table: &'static str,
        /// The conflicting name.
        name: String,
    },

    /// A link with the same type and endpoints already exists.
    #[error("duplicate link {link_type} from {from_id} to {to_id}")]
    DuplicateLink {
        /// Link type.
        link_type: String,
        /// Source endpoint.
        from_id: String,
        /// Target endpoint.
        to_id: String,
    },

    /// The table only accepts new rows.
    #[error("{table} is append-only")]
    AppendOnly {
        /// The append-only table.
        table: &'static str,
    },

    /// Relational cache error.
    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    /// Ledger read or write error.
    #[error("ledger error: {0}")]
    Ledger(#[from] cupboard_ledger::LedgerError),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid id error.
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId { id: id.into() }
    }

    /// Creates a not found error.
    pub fn not_found(table: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            table,
            id: id.into(),
        }
    }

    /// Creates an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Creates an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Creates an invalid name error.
    pub fn invalid_name(message: impl Into<String>) -> Self {
        Self::InvalidName {
            message: message.into(),
        }
    }

    /// Creates a duplicate name error.
    pub fn duplicate_name(table: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            table,
            name: name.into(),
        }
    }

    /// Returns true for errors caused by the caller's input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidId { .. }
                | Self::InvalidData { .. }
                | Self::InvalidFilter { .. }
                | Self::InvalidName { .. }
                | Self::InvalidValueType { .. }
        )
    }

    /// Returns true for uniqueness conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::DuplicateName { .. } | Self::DuplicateLink { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(CoreError::invalid_id("").is_validation());
        assert!(CoreError::invalid_filter("x").is_validation());
        assert!(!CoreError::not_found("crumbs", "x").is_validation());
        assert!(CoreError::duplicate_name("properties", "estimate").is_conflict());
        assert!(!CoreError::CupboardDetached.is_conflict());
    }

    #[test]
    fn messages_name_the_subject() {
        let err = CoreError::not_found("crumbs", "c1");
        assert_eq!(err.to_string(), "not found: c1 in crumbs");
        let err = CoreError::TableNotFound {
            name: "widgets".into(),
        };
        assert_eq!(err.to_string(), "table not found: widgets");
    }
}
