//! Record identifiers.

use uuid::Uuid;

/// Generates a new record id.
///
/// Ids are UUIDv7 strings: unique, and ordered by creation time when
/// compared as strings, so sorting by id sorts by age.
#[must_use]
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Separator between the two halves of a crumb property id.
pub(crate) const COMPOSITE_SEPARATOR: char = ':';

/// Builds the router id of a crumb property row.
#[must_use]
pub fn crumb_property_id(crumb_id: &str, property_id: &str) -> String {
    format!("{crumb_id}{COMPOSITE_SEPARATOR}{property_id}")
}

/// Splits a crumb property router id into `(crumb_id, property_id)`.
#[must_use]
pub fn split_crumb_property_id(id: &str) -> Option<(&str, &str)> {
    id.split_once(COMPOSITE_SEPARATOR)
        .filter(|(crumb, property)| !crumb.is_empty() && !property.is_empty())
}
