//! Entity records.
//!
//! These are plain data holders. Each serializes to exactly the fields of its
//! ledger line; unknown fields in a ledger line are ignored on read and
//! missing optional fields take their default.

use super::time::rfc3339;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A work item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Crumb {
    /// Record id.
    pub id: String,
    /// Display name; must not be empty.
    pub name: String,
    /// Open-ended state, e.g. `draft`, `ready`, `taken`. Empty means
    /// `draft` on create and the stored state on update.
    #[serde(default)]
    pub state: String,
    /// Creation time.
    #[serde(with = "rfc3339", default)]
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    #[serde(with = "rfc3339", default)]
    pub updated_at: DateTime<Utc>,
    /// Property values keyed by property id.
    ///
    /// Derived from the `crumb_properties` table; never written to the
    /// crumbs ledger. On `set`, only the entries present are written.
    #[serde(skip)]
    pub properties: BTreeMap<String, Value>,
}

impl Crumb {
    /// State given to crumbs created without one.
    pub const DRAFT: &'static str = "draft";
}

/// A work session grouping crumbs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trail {
    /// Record id.
    pub id: String,
    /// Lifecycle state: `active`, `completed` or `abandoned`.
    #[serde(default)]
    pub state: String,
    /// Creation time.
    #[serde(with = "rfc3339", default)]
    pub created_at: DateTime<Utc>,
    /// When the trail left the `active` state.
    #[serde(with = "rfc3339::option", default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Trail {
    /// State of a running trail; the default.
    pub const ACTIVE: &'static str = "active";
    /// Finished trail. Its crumbs are released and kept.
    pub const COMPLETED: &'static str = "completed";
    /// Given-up trail. Its crumbs are deleted.
    pub const ABANDONED: &'static str = "abandoned";
}

/// A typed graph edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Record id.
    pub id: String,
    /// Edge type, e.g. `belongs_to`.
    pub link_type: String,
    /// Source endpoint id.
    pub from_id: String,
    /// Target endpoint id.
    pub to_id: String,
    /// Creation time.
    #[serde(with = "rfc3339", default)]
    pub created_at: DateTime<Utc>,
}

impl Link {
    /// Crumb (from) is a member of trail (to).
    pub const BELONGS_TO: &'static str = "belongs_to";
    /// Crumb (from) is a child of crumb (to).
    pub const CHILD_OF: &'static str = "child_of";
    /// Trail (from) branches from crumb (to).
    pub const BRANCHES_FROM: &'static str = "branches_from";
    /// Crumb (from) is scoped to another entity (to).
    pub const SCOPED_TO: &'static str = "scoped_to";
}

/// A property definition: a named, typed attribute every crumb carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Record id.
    pub id: String,
    /// Globally unique name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// One of `text`, `integer`, `boolean`, `timestamp`, `list`,
    /// `categorical`.
    pub value_type: String,
    /// Creation time.
    #[serde(with = "rfc3339", default)]
    pub created_at: DateTime<Utc>,
}

/// A member of a categorical property's enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Record id.
    pub id: String,
    /// Owning property id.
    pub property_id: String,
    /// Name, unique within the owning property.
    pub name: String,
    /// Sort position; the lowest ordinal is the property default.
    #[serde(default)]
    pub ordinal: i64,
}

/// The value of one property on one crumb.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrumbProperty {
    /// Crumb id.
    pub crumb_id: String,
    /// Property id.
    pub property_id: String,
    /// Value type of the property when the value was written.
    #[serde(default)]
    pub value_type: String,
    /// The value.
    #[serde(default)]
    pub value: Value,
}

/// A free-form note attached to a crumb.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Record id.
    pub id: String,
    /// Kind of note, e.g. `comments`.
    pub table_name: String,
    /// Annotated crumb id.
    pub crumb_id: String,
    /// Property the note is scoped to, if any.
    #[serde(default)]
    pub property_id: Option<String>,
    /// Note body.
    #[serde(default)]
    pub content: String,
    /// Creation time.
    #[serde(with = "rfc3339", default)]
    pub created_at: DateTime<Utc>,
}

/// Shared mutable state with a monotonic version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stash {
    /// Record id.
    pub id: String,
    /// Unique name.
    pub name: String,
    /// Kind of stash, e.g. `context` or `counter`.
    #[serde(default)]
    pub stash_type: String,
    /// Stored value.
    #[serde(default)]
    pub value: Value,
    /// Incremented on every change, starting at 1.
    #[serde(default)]
    pub version: i64,
    /// Creation time.
    #[serde(with = "rfc3339", default)]
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    #[serde(with = "rfc3339", default)]
    pub updated_at: DateTime<Utc>,
}

/// One entry in the audit trail of a stash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StashHistory {
    /// Record id.
    pub id: String,
    /// Stash the entry belongs to.
    pub stash_id: String,
    /// Stash version after the operation.
    #[serde(default)]
    pub version: i64,
    /// Stash value after the operation.
    #[serde(default)]
    pub value: Value,
    /// `create`, `set` or `delete`.
    #[serde(default)]
    pub operation: String,
    /// Who made the change, if known.
    #[serde(default)]
    pub changed_by: Option<String>,
    /// Time of the change.
    #[serde(with = "rfc3339", default)]
    pub created_at: DateTime<Utc>,
}
