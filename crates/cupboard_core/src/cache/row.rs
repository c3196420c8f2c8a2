//! Mapping between entity records and cache rows.

use crate::entity::time;
use crate::entity::{
    Category, Crumb, CrumbProperty, Link, Metadata, Property, Stash, StashHistory, TableName, Trail,
};
use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use cupboard_ledger::{Record, RecordKey};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params_from_iter, Connection, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// An entity that lives in one cache table and one ledger.
///
/// `COLUMNS` lists the cache columns in the order `values` produces and
/// `from_row` consumes them. Column names equal the ledger field names.
pub(crate) trait CacheRow: Serialize + DeserializeOwned + Sized {
    /// Table (and ledger) of this entity.
    const TABLE: TableName;
    /// Cache columns.
    const COLUMNS: &'static [&'static str];
    /// Primary key columns, also the ledger match fields.
    const KEY: &'static [&'static str];
    /// Columns holding JSON-encoded values.
    const JSON_COLUMNS: &'static [&'static str] = &[];

    /// Reads a row selected with `COLUMNS`.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Column values in `COLUMNS` order.
    fn values(&self) -> CoreResult<Vec<SqlValue>>;

    /// Key values in `KEY` order.
    fn key(&self) -> Vec<&str>;

    /// Key used to match this entity's ledger line.
    fn ledger_key(&self) -> RecordKey {
        RecordKey::new(Self::KEY.iter().copied().zip(self.key()))
    }

    /// The ledger line for this entity.
    fn to_record(&self) -> CoreResult<Record> {
        Ok(cupboard_ledger::to_record(self)?)
    }
}

/// A `WHERE` condition on one column.
#[derive(Debug, Clone)]
pub(crate) struct Predicate {
    column: &'static str,
    op: Op,
}

#[derive(Debug, Clone)]
enum Op {
    Eq(SqlValue),
    In(Vec<SqlValue>),
}

impl Predicate {
    /// `column = value`.
    pub(crate) fn eq(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Self {
            column,
            op: Op::Eq(value.into()),
        }
    }

    /// `column = text`.
    pub(crate) fn text(column: &'static str, value: &str) -> Self {
        Self::eq(column, SqlValue::Text(value.to_string()))
    }

    /// `column IN (values)`.
    pub(crate) fn one_of(column: &'static str, values: Vec<SqlValue>) -> Self {
        Self {
            column,
            op: Op::In(values),
        }
    }
}

fn where_clause(predicates: &[Predicate]) -> (String, Vec<SqlValue>) {
    if predicates.is_empty() {
        return (String::new(), Vec::new());
    }
    let mut params = Vec::new();
    let mut parts = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        match &predicate.op {
            Op::Eq(value) => {
                params.push(value.clone());
                parts.push(format!("{} = ?{}", predicate.column, params.len()));
            }
            Op::In(values) => {
                let start = params.len();
                params.extend(values.iter().cloned());
                let slots: Vec<String> = (start + 1..=params.len()).map(|i| format!("?{i}")).collect();
                parts.push(format!("{} IN ({})", predicate.column, slots.join(", ")));
            }
        }
    }
    (format!(" WHERE {}", parts.join(" AND ")), params)
}

fn key_predicates<T: CacheRow>(key: &[&str]) -> Vec<Predicate> {
    T::KEY
        .iter()
        .zip(key)
        .map(|(column, value)| Predicate::text(column, value))
        .collect()
}

fn insert_sql<T: CacheRow>(on_conflict_update: bool) -> String {
    let slots: Vec<String> = (1..=T::COLUMNS.len()).map(|i| format!("?{i}")).collect();
    let action = if on_conflict_update {
        let assignments: Vec<String> = T::COLUMNS
            .iter()
            .filter(|column| !T::KEY.contains(column))
            .map(|column| format!("{column} = excluded.{column}"))
            .collect();
        format!("DO UPDATE SET {}", assignments.join(", "))
    } else {
        "DO NOTHING".to_string()
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        T::TABLE.as_str(),
        T::COLUMNS.join(", "),
        slots.join(", "),
        T::KEY.join(", "),
        action
    )
}

/// Inserts `row`, replacing the row with the same key.
///
/// Other unique constraints still apply and fail the statement.
pub(crate) fn upsert<T: CacheRow>(conn: &Connection, row: &T) -> CoreResult<()> {
    let mut stmt = conn.prepare_cached(&insert_sql::<T>(true))?;
    stmt.execute(params_from_iter(row.values()?))?;
    Ok(())
}

/// Inserts `row` unless a row with the same key exists. Returns whether it
/// was inserted.
pub(crate) fn insert_if_absent<T: CacheRow>(conn: &Connection, row: &T) -> CoreResult<bool> {
    let mut stmt = conn.prepare_cached(&insert_sql::<T>(false))?;
    Ok(stmt.execute(params_from_iter(row.values()?))? > 0)
}

/// Selects rows matching every predicate, ordered by key.
pub(crate) fn select<T: CacheRow>(conn: &Connection, predicates: &[Predicate]) -> CoreResult<Vec<T>> {
    let (clause, params) = where_clause(predicates);
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        T::COLUMNS.join(", "),
        T::TABLE.as_str(),
        clause,
        T::KEY.join(", ")
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), |row| T::from_row(row))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Finds the row with the given key values.
pub(crate) fn find<T: CacheRow>(conn: &Connection, key: &[&str]) -> CoreResult<Option<T>> {
    Ok(select::<T>(conn, &key_predicates::<T>(key))?.into_iter().next())
}

/// Counts rows matching every predicate.
pub(crate) fn count<T: CacheRow>(conn: &Connection, predicates: &[Predicate]) -> CoreResult<i64> {
    let (clause, params) = where_clause(predicates);
    let sql = format!("SELECT COUNT(*) FROM {}{}", T::TABLE.as_str(), clause);
    let mut stmt = conn.prepare_cached(&sql)?;
    Ok(stmt.query_row(params_from_iter(params), |row| row.get(0))?)
}

/// Deletes rows matching every predicate and returns them.
pub(crate) fn delete_where<T: CacheRow>(
    conn: &Connection,
    predicates: &[Predicate],
) -> CoreResult<Vec<T>> {
    let doomed = select::<T>(conn, predicates)?;
    if !doomed.is_empty() {
        let (clause, params) = where_clause(predicates);
        let sql = format!("DELETE FROM {}{}", T::TABLE.as_str(), clause);
        conn.prepare_cached(&sql)?.execute(params_from_iter(params))?;
    }
    Ok(doomed)
}

/// Deletes the row with the given key values. Returns it if it existed.
pub(crate) fn delete<T: CacheRow>(conn: &Connection, key: &[&str]) -> CoreResult<Option<T>> {
    Ok(delete_where::<T>(conn, &key_predicates::<T>(key))?.into_iter().next())
}

fn ts(value: &DateTime<Utc>) -> SqlValue {
    SqlValue::Text(time::format(value))
}

fn opt_ts(value: &Option<DateTime<Utc>>) -> SqlValue {
    value.as_ref().map_or(SqlValue::Null, ts)
}

fn text(value: &str) -> SqlValue {
    SqlValue::Text(value.to_string())
}

fn opt_text(value: &Option<String>) -> SqlValue {
    value.as_deref().map_or(SqlValue::Null, text)
}

fn json(value: &Value) -> CoreResult<SqlValue> {
    if value.is_null() {
        Ok(SqlValue::Null)
    } else {
        Ok(SqlValue::Text(serde_json::to_string(value)?))
    }
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    time::parse(&raw).map_err(|err| conversion_error(idx, err))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => time::parse(&raw)
            .map(Some)
            .map_err(|err| conversion_error(idx, err)),
        None => Ok(None),
    }
}

fn get_json(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => serde_json::from_str(&raw).map_err(|err| conversion_error(idx, err)),
        None => Ok(Value::Null),
    }
}

impl CacheRow for Crumb {
    const TABLE: TableName = TableName::Crumbs;
    const COLUMNS: &'static [&'static str] = &["id", "name", "state", "created_at", "updated_at"];
    const KEY: &'static [&'static str] = &["id"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            state: row.get(2)?,
            created_at: get_ts(row, 3)?,
            updated_at: get_ts(row, 4)?,
            properties: Default::default(),
        })
    }

    fn values(&self) -> CoreResult<Vec<SqlValue>> {
        Ok(vec![
            text(&self.id),
            text(&self.name),
            text(&self.state),
            ts(&self.created_at),
            ts(&self.updated_at),
        ])
    }

    fn key(&self) -> Vec<&str> {
        vec![&self.id]
    }
}

impl CacheRow for Trail {
    const TABLE: TableName = TableName::Trails;
    const COLUMNS: &'static [&'static str] = &["id", "state", "created_at", "completed_at"];
    const KEY: &'static [&'static str] = &["id"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            state: row.get(1)?,
            created_at: get_ts(row, 2)?,
            completed_at: get_opt_ts(row, 3)?,
        })
    }

    fn values(&self) -> CoreResult<Vec<SqlValue>> {
        Ok(vec![
            text(&self.id),
            text(&self.state),
            ts(&self.created_at),
            opt_ts(&self.completed_at),
        ])
    }

    fn key(&self) -> Vec<&str> {
        vec![&self.id]
    }
}

impl CacheRow for Link {
    const TABLE: TableName = TableName::Links;
    const COLUMNS: &'static [&'static str] = &["id", "link_type", "from_id", "to_id", "created_at"];
    const KEY: &'static [&'static str] = &["id"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            link_type: row.get(1)?,
            from_id: row.get(2)?,
            to_id: row.get(3)?,
            created_at: get_ts(row, 4)?,
        })
    }

    fn values(&self) -> CoreResult<Vec<SqlValue>> {
        Ok(vec![
            text(&self.id),
            text(&self.link_type),
            text(&self.from_id),
            text(&self.to_id),
            ts(&self.created_at),
        ])
    }

    fn key(&self) -> Vec<&str> {
        vec![&self.id]
    }
}

impl CacheRow for Property {
    const TABLE: TableName = TableName::Properties;
    const COLUMNS: &'static [&'static str] = &["id", "name", "description", "value_type", "created_at"];
    const KEY: &'static [&'static str] = &["id"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            value_type: row.get(3)?,
            created_at: get_ts(row, 4)?,
        })
    }

    fn values(&self) -> CoreResult<Vec<SqlValue>> {
        Ok(vec![
            text(&self.id),
            text(&self.name),
            opt_text(&self.description),
            text(&self.value_type),
            ts(&self.created_at),
        ])
    }

    fn key(&self) -> Vec<&str> {
        vec![&self.id]
    }
}

impl CacheRow for Category {
    const TABLE: TableName = TableName::Categories;
    const COLUMNS: &'static [&'static str] = &["id", "property_id", "name", "ordinal"];
    const KEY: &'static [&'static str] = &["id"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            property_id: row.get(1)?,
            name: row.get(2)?,
            ordinal: row.get(3)?,
        })
    }

    fn values(&self) -> CoreResult<Vec<SqlValue>> {
        Ok(vec![
            text(&self.id),
            text(&self.property_id),
            text(&self.name),
            SqlValue::Integer(self.ordinal),
        ])
    }

    fn key(&self) -> Vec<&str> {
        vec![&self.id]
    }
}

impl CacheRow for CrumbProperty {
    const TABLE: TableName = TableName::CrumbProperties;
    const COLUMNS: &'static [&'static str] = &["crumb_id", "property_id", "value_type", "value"];
    const KEY: &'static [&'static str] = &["crumb_id", "property_id"];
    const JSON_COLUMNS: &'static [&'static str] = &["value"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            crumb_id: row.get(0)?,
            property_id: row.get(1)?,
            value_type: row.get(2)?,
            value: get_json(row, 3)?,
        })
    }

    fn values(&self) -> CoreResult<Vec<SqlValue>> {
        Ok(vec![
            text(&self.crumb_id),
            text(&self.property_id),
            text(&self.value_type),
            json(&self.value)?,
        ])
    }

    fn key(&self) -> Vec<&str> {
        vec![&self.crumb_id, &self.property_id]
    }
}

impl CacheRow for Metadata {
    const TABLE: TableName = TableName::Metadata;
    const COLUMNS: &'static [&'static str] =
        &["id", "table_name", "crumb_id", "property_id", "content", "created_at"];
    const KEY: &'static [&'static str] = &["id"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            table_name: row.get(1)?,
            crumb_id: row.get(2)?,
            property_id: row.get(3)?,
            content: row.get(4)?,
            created_at: get_ts(row, 5)?,
        })
    }

    fn values(&self) -> CoreResult<Vec<SqlValue>> {
        Ok(vec![
            text(&self.id),
            text(&self.table_name),
            text(&self.crumb_id),
            opt_text(&self.property_id),
            text(&self.content),
            ts(&self.created_at),
        ])
    }

    fn key(&self) -> Vec<&str> {
        vec![&self.id]
    }
}

impl CacheRow for Stash {
    const TABLE: TableName = TableName::Stashes;
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "stash_type", "value", "version", "created_at", "updated_at"];
    const KEY: &'static [&'static str] = &["id"];
    const JSON_COLUMNS: &'static [&'static str] = &["value"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            stash_type: row.get(2)?,
            value: get_json(row, 3)?,
            version: row.get(4)?,
            created_at: get_ts(row, 5)?,
            updated_at: get_ts(row, 6)?,
        })
    }

    fn values(&self) -> CoreResult<Vec<SqlValue>> {
        Ok(vec![
            text(&self.id),
            text(&self.name),
            text(&self.stash_type),
            json(&self.value)?,
            SqlValue::Integer(self.version),
            ts(&self.created_at),
            ts(&self.updated_at),
        ])
    }

    fn key(&self) -> Vec<&str> {
        vec![&self.id]
    }
}

impl CacheRow for StashHistory {
    const TABLE: TableName = TableName::StashHistory;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "stash_id",
        "version",
        "value",
        "operation",
        "changed_by",
        "created_at",
    ];
    const KEY: &'static [&'static str] = &["id"];
    const JSON_COLUMNS: &'static [&'static str] = &["value"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            stash_id: row.get(1)?,
            version: row.get(2)?,
            value: get_json(row, 3)?,
            operation: row.get(4)?,
            changed_by: row.get(5)?,
            created_at: get_ts(row, 6)?,
        })
    }

    fn values(&self) -> CoreResult<Vec<SqlValue>> {
        Ok(vec![
            text(&self.id),
            text(&self.stash_id),
            SqlValue::Integer(self.version),
            json(&self.value)?,
            text(&self.operation),
            opt_text(&self.changed_by),
            ts(&self.created_at),
        ])
    }

    fn key(&self) -> Vec<&str> {
        vec![&self.id]
    }
}
