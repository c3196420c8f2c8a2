//! Line codec: one JSON object per line.

use crate::error::{LedgerError, LedgerResult};
use crate::Record;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Why a ledger line was not turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// The line is not valid JSON.
    #[error("malformed JSON: {0}")]
    Malformed(String),
    /// The line is valid JSON but not an object.
    #[error("line is not a JSON object")]
    NotAnObject,
}

/// Parses a single non-empty ledger line into a record.
pub fn decode_line(line: &str) -> Result<Record, LineError> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(LineError::NotAnObject),
        Err(err) => Err(LineError::Malformed(err.to_string())),
    }
}

/// Serializes a record as a single line without the trailing newline.
pub fn encode_record(record: &Record) -> LedgerResult<String> {
    Ok(serde_json::to_string(record)?)
}

/// Converts any serializable value into a ledger record.
///
/// Fails with [`LedgerError::NotAnObject`] for values that do not serialize
/// to a JSON object (scalars, sequences, unit structs).
pub fn to_record<T: Serialize>(value: &T) -> LedgerResult<Record> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(LedgerError::NotAnObject),
    }
}
