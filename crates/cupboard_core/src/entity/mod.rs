//! Entity types and table names.

mod id;
mod model;
pub mod time;

pub use id::{crumb_property_id, new_id, split_crumb_property_id};
pub use model::{Category, Crumb, CrumbProperty, Link, Metadata, Property, Stash, StashHistory, Trail};

use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::str::FromStr;

/// The tables a cupboard exposes, one per entity type and ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableName {
    /// Work items.
    Crumbs,
    /// Sessions.
    Trails,
    /// Graph edges.
    Links,
    /// Property definitions.
    Properties,
    /// Categories of categorical properties.
    Categories,
    /// Property values per crumb.
    CrumbProperties,
    /// Notes attached to crumbs.
    Metadata,
    /// Shared state.
    Stashes,
    /// Append-only stash audit trail.
    StashHistory,
}

impl TableName {
    /// Every table, in load order: referenced tables come before the
    /// tables that refer to them.
    pub const ALL: [TableName; 9] = [
        TableName::Properties,
        TableName::Categories,
        TableName::Crumbs,
        TableName::CrumbProperties,
        TableName::Trails,
        TableName::Links,
        TableName::Metadata,
        TableName::Stashes,
        TableName::StashHistory,
    ];

    /// Returns the canonical table name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crumbs => "crumbs",
            Self::Trails => "trails",
            Self::Links => "links",
            Self::Properties => "properties",
            Self::Categories => "categories",
            Self::CrumbProperties => "crumb_properties",
            Self::Metadata => "metadata",
            Self::Stashes => "stashes",
            Self::StashHistory => "stash_history",
        }
    }

    /// Returns the ledger file name for this table.
    #[must_use]
    pub const fn ledger_file(self) -> &'static str {
        match self {
            Self::Crumbs => "crumbs.jsonl",
            Self::Trails => "trails.jsonl",
            Self::Links => "links.jsonl",
            Self::Properties => "properties.jsonl",
            Self::Categories => "categories.jsonl",
            Self::CrumbProperties => "crumb_properties.jsonl",
            Self::Metadata => "metadata.jsonl",
            Self::Stashes => "stashes.jsonl",
            Self::StashHistory => "stash_history.jsonl",
        }
    }
}

impl FromStr for TableName {
    type Err = CoreError;

    fn from_str(name: &str) -> CoreResult<Self> {
        let table = match name {
            "crumbs" | "items" => Self::Crumbs,
            "trails" | "sessions" => Self::Trails,
            "links" => Self::Links,
            "properties" | "attribute_types" => Self::Properties,
            "categories" => Self::Categories,
            "crumb_properties" | "attribute_values" => Self::CrumbProperties,
            "metadata" | "annotations" => Self::Metadata,
            "stashes" => Self::Stashes,
            "stash_history" => Self::StashHistory,
            _ => {
                return Err(CoreError::TableNotFound {
                    name: name.to_string(),
                })
            }
        };
        Ok(table)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any entity, tagged with its type.
///
/// The table router takes and returns `Entity` values; a `set` whose
/// variant does not belong to the target table is rejected with
/// `InvalidData`.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// A work item.
    Crumb(Crumb),
    /// A session.
    Trail(Trail),
    /// A graph edge.
    Link(Link),
    /// A property definition.
    Property(Property),
    /// A category.
    Category(Category),
    /// A property value.
    CrumbProperty(CrumbProperty),
    /// A note.
    Metadata(Metadata),
    /// Shared state.
    Stash(Stash),
    /// A stash audit entry.
    StashHistory(StashHistory),
}

macro_rules! entity_variants {
    ($($variant:ident => $table:ident, $as_ref:ident, $into:ident;)*) => {
        impl Entity {
            /// Returns the table this entity belongs to.
            #[must_use]
            pub fn table(&self) -> TableName {
                match self {
                    $(Self::$variant(_) => TableName::$table,)*
                }
            }

            $(
                #[doc = concat!("Returns the inner `", stringify!($variant), "`, if this is one.")]
                #[must_use]
                pub fn $as_ref(&self) -> Option<&$variant> {
                    match self {
                        Self::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                #[doc = concat!("Converts into the inner `", stringify!($variant), "`, if this is one.")]
                #[must_use]
                pub fn $into(self) -> Option<$variant> {
                    match self {
                        Self::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            )*
        }

        $(
            impl From<$variant> for Entity {
                fn from(inner: $variant) -> Self {
                    Self::$variant(inner)
                }
            }
        )*
    };
}

entity_variants! {
    Crumb => Crumbs, as_crumb, into_crumb;
    Trail => Trails, as_trail, into_trail;
    Link => Links, as_link, into_link;
    Property => Properties, as_property, into_property;
    Category => Categories, as_category, into_category;
    CrumbProperty => CrumbProperties, as_crumb_property, into_crumb_property;
    Metadata => Metadata, as_metadata, into_metadata;
    Stash => Stashes, as_stash, into_stash;
    StashHistory => StashHistory, as_stash_history, into_stash_history;
}

impl Entity {
    /// Returns the router id of this entity.
    ///
    /// Crumb properties have no id of their own; their router id is
    /// `"<crumb_id>:<property_id>"`.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Crumb(e) => e.id.clone(),
            Self::Trail(e) => e.id.clone(),
            Self::Link(e) => e.id.clone(),
            Self::Property(e) => e.id.clone(),
            Self::Category(e) => e.id.clone(),
            Self::CrumbProperty(e) => crumb_property_id(&e.crumb_id, &e.property_id),
            Self::Metadata(e) => e.id.clone(),
            Self::Stash(e) => e.id.clone(),
            Self::StashHistory(e) => e.id.clone(),
        }
    }
}
