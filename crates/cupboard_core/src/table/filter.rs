//! Fetch filters.

use crate::cache::row::Predicate;
use crate::cache::CacheRow;
use crate::error::{CoreError, CoreResult};
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field-name-keyed predicates for [`Table::fetch`](super::Table::fetch).
///
/// Every entry must hold. A string, number or boolean matches fields equal
/// to it; a non-empty array of those matches fields equal to any member.
/// Field names are the entity's ledger field names.
///
/// ```
/// use cupboard_core::Filter;
/// use serde_json::json;
///
/// let filter = Filter::new()
///     .with("state", json!(["draft", "ready"]))
///     .with("name", "Implement X");
/// assert_eq!(filter.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: BTreeMap<String, Value>,
}

impl Filter {
    /// Creates an empty filter, which matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition on `field`, replacing any earlier one.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Returns true if the filter has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterates over `(field, value)` conditions in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(field, value)| (field.as_str(), value))
    }

    pub(crate) fn predicates<T: CacheRow>(&self) -> CoreResult<Vec<Predicate>> {
        self.fields
            .iter()
            .map(|(field, value)| {
                let column = T::COLUMNS
                    .iter()
                    .copied()
                    .find(|column| column == field)
                    .ok_or_else(|| {
                        CoreError::invalid_filter(format!("{} has no field {field}", T::TABLE))
                    })?;
                let json = T::JSON_COLUMNS.contains(&column);
                match value {
                    Value::Array(items) if items.is_empty() => Err(CoreError::invalid_filter(
                        format!("empty list for field {field}"),
                    )),
                    Value::Array(items) => {
                        let values = items
                            .iter()
                            .map(|item| scalar(field, item, json))
                            .collect::<CoreResult<Vec<_>>>()?;
                        Ok(Predicate::one_of(column, values))
                    }
                    other => Ok(Predicate::eq(column, scalar(field, other, json)?)),
                }
            })
            .collect()
    }
}

/// Converts one filter value to the form its column stores.
fn scalar(field: &str, value: &Value, json: bool) -> CoreResult<SqlValue> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => Err(CoreError::invalid_filter(format!(
            "unsupported value {value} for field {field}"
        ))),
        _ if json => Ok(SqlValue::Text(value.to_string())),
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(SqlValue::Integer(i)),
            None => n
                .as_f64()
                .map(SqlValue::Real)
                .ok_or_else(|| CoreError::invalid_filter(format!("number {n} out of range for {field}"))),
        },
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        }
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            fields: map.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Crumb, CrumbProperty};
    use serde_json::json;

    #[test]
    fn empty_filter_has_no_predicates() {
        assert!(Filter::new().predicates::<Crumb>().unwrap().is_empty());
    }

    #[test]
    fn scalars_and_lists() {
        let filter: Filter = [("state", json!("draft")), ("id", json!(["a", "b"]))]
            .into_iter()
            .collect();
        assert_eq!(filter.predicates::<Crumb>().unwrap().len(), 2);
    }

    #[test]
    fn rejects_unsupported_values() {
        for value in [json!(null), json!({"a": 1}), json!([]), json!([["nested"]]), json!([null])] {
            let filter = Filter::new().with("state", value);
            assert!(matches!(
                filter.predicates::<Crumb>(),
                Err(CoreError::InvalidFilter { .. })
            ));
        }
    }

    #[test]
    fn rejects_unknown_fields() {
        let filter = Filter::new().with("properties", "x");
        assert!(matches!(
            filter.predicates::<Crumb>(),
            Err(CoreError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn json_columns_compare_encoded() {
        assert_eq!(
            scalar("value", &json!("abc"), true).unwrap(),
            SqlValue::Text("\"abc\"".into())
        );
        assert_eq!(scalar("value", &json!(5), true).unwrap(), SqlValue::Text("5".into()));
        assert!(Filter::new()
            .with("value", 5)
            .predicates::<CrumbProperty>()
            .is_ok());
    }

    #[test]
    fn from_json_object() {
        let filter = Filter::from(json!({"state": "draft"}).as_object().cloned().unwrap());
        assert_eq!(filter.iter().next(), Some(("state", &json!("draft"))));
    }
}
