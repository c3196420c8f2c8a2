//! Keys used to match ledger lines for update and delete.

use crate::Record;
use serde_json::Value;

/// Identifies the line(s) an update or delete applies to.
///
/// Most ledgers are keyed by a single `id` field. Attribute values are keyed
/// by the pair of owning ids, so a key may name two fields. A line matches
/// when every field is present as a JSON string equal to the key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    fields: Vec<(String, String)>,
}

impl RecordKey {
    /// Creates a key from `(field, value)` pairs.
    pub fn new<F, V>(fields: impl IntoIterator<Item = (F, V)>) -> Self
    where
        F: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        }
    }

    /// Creates a key over a single field.
    pub fn single(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            fields: vec![(field.into(), value.into())],
        }
    }

    /// Creates a key over two fields.
    pub fn composite(
        first: (impl Into<String>, impl Into<String>),
        second: (impl Into<String>, impl Into<String>),
    ) -> Self {
        Self {
            fields: vec![
                (first.0.into(), first.1.into()),
                (second.0.into(), second.1.into()),
            ],
        }
    }

    /// Shorthand for the common `id` key.
    pub fn id(value: impl Into<String>) -> Self {
        Self::single("id", value)
    }

    /// Returns the `(field, value)` pairs of this key.
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Returns the field names of this key, in key order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(field, _)| field.as_str()).collect()
    }

    /// Builds the key `record` has under `field_names`.
    ///
    /// Returns `None` when any of the fields is missing or not a string.
    #[must_use]
    pub fn extract(record: &Record, field_names: &[&str]) -> Option<Self> {
        let fields = field_names
            .iter()
            .map(|field| match record.get(*field) {
                Some(Value::String(value)) => Some(((*field).to_string(), value.clone())),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self { fields })
    }

    /// Returns true if `record` carries every key field with an equal value.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.fields.iter().all(|(field, expected)| {
            matches!(record.get(field), Some(Value::String(actual)) if actual == expected)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn single_key_matches_id() {
        let key = RecordKey::id("a");
        assert!(key.matches(&record(json!({"id": "a", "name": "x"}))));
        assert!(!key.matches(&record(json!({"id": "b"}))));
        assert!(!key.matches(&record(json!({"name": "a"}))));
    }

    #[test]
    fn composite_key_needs_both_fields() {
        let key = RecordKey::composite(("crumb_id", "c1"), ("property_id", "p1"));
        assert!(key.matches(&record(json!({"crumb_id": "c1", "property_id": "p1"}))));
        assert!(!key.matches(&record(json!({"crumb_id": "c1", "property_id": "p2"}))));
        assert!(!key.matches(&record(json!({"crumb_id": "c1"}))));
    }

    #[test]
    fn extract_round_trips_matching_key() {
        let key = RecordKey::composite(("crumb_id", "c1"), ("property_id", "p1"));
        let rec = record(json!({"crumb_id": "c1", "property_id": "p1", "value": 3}));
        assert_eq!(RecordKey::extract(&rec, &key.field_names()), Some(key));
        assert_eq!(RecordKey::extract(&rec, &["id"]), None);
    }

    #[test]
    fn non_string_values_never_match() {
        let key = RecordKey::id("1");
        assert!(!key.matches(&record(json!({"id": 1}))));
    }
}
