//! # Cupboard Ledger
//!
//! Durable, line-delimited JSON files for Cupboard.
//!
//! A ledger holds one JSON object per line and is the source of truth for a
//! single entity type. This crate does not know about entity types: records
//! are plain JSON objects and updates are matched by [`RecordKey`].
//!
//! ## Guarantees
//!
//! - Reads skip empty lines and lines that are not JSON objects
//! - Upserts, removals and rewrites replace the file atomically
//!   (temporary file, sync, rename, directory sync)
//! - Appends never rewrite prior content and are synced before returning
//!
//! ## Example
//!
//! ```rust
//! use cupboard_ledger::{Ledger, RecordKey};
//! use serde_json::json;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let ledger = Ledger::open(&dir.path().join("trails.jsonl")).unwrap();
//! let trail = json!({"id": "t1", "state": "active"});
//! ledger.upsert(&RecordKey::id("t1"), trail.as_object().unwrap()).unwrap();
//! assert_eq!(ledger.read_records().unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod file;
mod key;

pub use codec::{decode_line, encode_record, to_record, LineError};
pub use error::{LedgerError, LedgerResult};
pub use file::{Ledger, LedgerScan};
pub use key::RecordKey;

/// A single ledger record: a JSON object.
pub type Record = serde_json::Map<String, serde_json::Value>;
