//! Property values: types, defaults and the every-crumb-has-every-property
//! invariant.
//!
//! Both directions of the invariant go through [`default_for`]: creating a
//! crumb initializes one value per defined property ([`init_crumb`]), and
//! defining a property backfills one value per existing crumb
//! ([`backfill`]). Both insert only when the row is absent, inside the
//! caller's transaction.

use crate::cache::row::{self, Predicate};
use crate::entity::{new_id, time, Category, Crumb, CrumbProperty, Property};
use crate::error::{CoreError, CoreResult};
use crate::mirror::MirrorBatch;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// The type of a property's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// JSON string.
    Text,
    /// JSON integer.
    Integer,
    /// JSON boolean.
    Boolean,
    /// RFC 3339 string, or null.
    Timestamp,
    /// JSON array.
    List,
    /// Id of one of the property's categories, or null.
    Categorical,
}

impl ValueType {
    /// Every value type.
    pub const ALL: [ValueType; 6] = [
        Self::Text,
        Self::Integer,
        Self::Boolean,
        Self::Timestamp,
        Self::List,
        Self::Categorical,
    ];

    /// Returns the stored name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Categorical => "categorical",
        }
    }
}

impl FromStr for ValueType {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::ALL
            .into_iter()
            .find(|value_type| value_type.as_str() == s)
            .ok_or_else(|| CoreError::InvalidValueType {
                value_type: s.to_string(),
            })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the default value for a property of `value_type`.
///
/// `first_category` is the id of the categorical property's category with
/// the lowest ordinal (ties broken by name); it is ignored for other types.
#[must_use]
pub fn default_value(value_type: ValueType, first_category: Option<&str>) -> Value {
    match value_type {
        ValueType::Text => Value::String(String::new()),
        ValueType::Integer => Value::from(0),
        ValueType::Boolean => Value::Bool(false),
        ValueType::Timestamp => Value::Null,
        ValueType::List => Value::Array(Vec::new()),
        ValueType::Categorical => first_category.map_or(Value::Null, |id| Value::String(id.to_string())),
    }
}

fn first_category(conn: &Connection, property_id: &str) -> CoreResult<Option<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM categories WHERE property_id = ?1 ORDER BY ordinal, name LIMIT 1",
    )?;
    Ok(stmt.query_row([property_id], |row| row.get(0)).optional()?)
}

/// Returns the current default value for `property`.
pub(crate) fn default_for(conn: &Connection, property: &Property) -> CoreResult<Value> {
    let value_type = property.value_type.parse::<ValueType>()?;
    let first = match value_type {
        ValueType::Categorical => first_category(conn, &property.id)?,
        _ => None,
    };
    Ok(default_value(value_type, first.as_deref()))
}

/// Checks that `value` fits `property`.
pub(crate) fn validate_value(conn: &Connection, property: &Property, value: &Value) -> CoreResult<()> {
    let value_type = property.value_type.parse::<ValueType>()?;
    let ok = match (value_type, value) {
        (ValueType::Text, Value::String(_)) => true,
        (ValueType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (ValueType::Boolean, Value::Bool(_)) => true,
        (ValueType::Timestamp, Value::Null) => true,
        (ValueType::Timestamp, Value::String(s)) => time::parse(s).is_ok(),
        (ValueType::List, Value::Array(_)) => true,
        (ValueType::Categorical, Value::Null) => true,
        (ValueType::Categorical, Value::String(id)) => {
            let category: Option<Category> = row::find(conn, &[id.as_str()])?;
            category.is_some_and(|c| c.property_id == property.id)
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(CoreError::invalid_data(format!(
            "value {value} does not fit {value_type} property {}",
            property.name
        )))
    }
}

fn insert_default(
    conn: &Connection,
    crumb_id: &str,
    property: &Property,
    default: &Value,
    batch: &mut MirrorBatch,
) -> CoreResult<bool> {
    let value = CrumbProperty {
        crumb_id: crumb_id.to_string(),
        property_id: property.id.clone(),
        value_type: property.value_type.clone(),
        value: default.clone(),
    };
    let inserted = row::insert_if_absent(conn, &value)?;
    if inserted {
        batch.upsert(&value)?;
    }
    Ok(inserted)
}

/// Gives a new crumb a default value for every defined property.
pub(crate) fn init_crumb(conn: &Connection, crumb_id: &str, batch: &mut MirrorBatch) -> CoreResult<usize> {
    let mut inserted = 0;
    for property in row::select::<Property>(conn, &[])? {
        let default = default_for(conn, &property)?;
        if insert_default(conn, crumb_id, &property, &default, batch)? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Gives every existing crumb a default value for `property`.
pub(crate) fn backfill(conn: &Connection, property: &Property, batch: &mut MirrorBatch) -> CoreResult<usize> {
    let default = default_for(conn, property)?;
    let mut stmt = conn.prepare_cached("SELECT id FROM crumbs ORDER BY id")?;
    let crumb_ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut inserted = 0;
    for crumb_id in crumb_ids {
        if insert_default(conn, &crumb_id, property, &default, batch)? {
            inserted += 1;
        }
    }
    debug!(property = %property.name, inserted, "backfilled property values");
    Ok(inserted)
}

/// Fills in every missing (crumb, property) value.
pub(crate) fn repair(conn: &Connection, batch: &mut MirrorBatch) -> CoreResult<usize> {
    let mut inserted = 0;
    for property in row::select::<Property>(conn, &[])? {
        inserted += backfill(conn, &property, batch)?;
    }
    if inserted > 0 {
        info!(inserted, "repaired missing property values");
    }
    Ok(inserted)
}

/// Loads the property values of `crumb` into its `properties` map.
pub(crate) fn attach_values(conn: &Connection, crumb: &mut Crumb) -> CoreResult<()> {
    let values: Vec<CrumbProperty> = row::select(conn, &[Predicate::text("crumb_id", &crumb.id)])?;
    crumb.properties = values
        .into_iter()
        .map(|value| (value.property_id, value.value))
        .collect();
    Ok(())
}

/// Validates and inserts a new property with its initial categories, then
/// backfills every crumb.
///
/// This is the one definition path: user `set` calls and built-in seeding
/// both use it.
pub(crate) fn define(
    conn: &Connection,
    mut property: Property,
    categories: &[&str],
    batch: &mut MirrorBatch,
) -> CoreResult<Property> {
    check_new_property(conn, &property)?;
    if property.id.is_empty() {
        property.id = new_id();
    }
    property.created_at = time::now();
    row::upsert(conn, &property)?;
    batch.upsert(&property)?;

    for (ordinal, name) in categories.iter().enumerate() {
        let category = Category {
            id: new_id(),
            property_id: property.id.clone(),
            name: (*name).to_string(),
            ordinal: ordinal as i64,
        };
        row::upsert(conn, &category)?;
        batch.upsert(&category)?;
    }

    backfill(conn, &property, batch)?;
    Ok(property)
}

fn check_new_property(conn: &Connection, property: &Property) -> CoreResult<()> {
    if property.name.trim().is_empty() {
        return Err(CoreError::invalid_name("property name must not be empty"));
    }
    property.value_type.parse::<ValueType>()?;
    check_unique_name(conn, property)
}

/// Fails with `DuplicateName` if another property already uses the name.
pub(crate) fn check_unique_name(conn: &Connection, property: &Property) -> CoreResult<()> {
    let same_name: Vec<Property> = row::select(conn, &[Predicate::text("name", &property.name)])?;
    if same_name.iter().any(|other| other.id != property.id) {
        return Err(CoreError::duplicate_name("properties", &property.name));
    }
    Ok(())
}

/// A property every cupboard has.
struct Builtin {
    name: &'static str,
    value_type: ValueType,
    description: &'static str,
    categories: &'static [&'static str],
}

const BUILTINS: [Builtin; 5] = [
    Builtin {
        name: "priority",
        value_type: ValueType::Categorical,
        description: "How urgent the crumb is",
        categories: &["highest", "high", "medium", "low", "lowest"],
    },
    Builtin {
        name: "type",
        value_type: ValueType::Categorical,
        description: "Kind of work",
        categories: &["task", "epic", "bug", "chore"],
    },
    Builtin {
        name: "description",
        value_type: ValueType::Text,
        description: "Longer explanation of the crumb",
        categories: &[],
    },
    Builtin {
        name: "owner",
        value_type: ValueType::Text,
        description: "Who is working on the crumb",
        categories: &[],
    },
    Builtin {
        name: "labels",
        value_type: ValueType::List,
        description: "Free-form tags",
        categories: &[],
    },
];

/// Defines the built-in properties that do not exist yet.
pub(crate) fn seed_builtins(conn: &Connection, batch: &mut MirrorBatch) -> CoreResult<usize> {
    let mut seeded = 0;
    for builtin in &BUILTINS {
        if row::count::<Property>(conn, &[Predicate::text("name", builtin.name)])? > 0 {
            continue;
        }
        let property = Property {
            name: builtin.name.to_string(),
            description: Some(builtin.description.to_string()),
            value_type: builtin.value_type.as_str().to_string(),
            ..Default::default()
        };
        define(conn, property, builtin.categories, batch)?;
        seeded += 1;
    }
    if seeded > 0 {
        info!(seeded, "seeded built-in properties");
    }
    Ok(seeded)
}
