//! Property-based test generators using proptest.

use cupboard_core::{Crumb, ValueType};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for crumb names: non-empty, printable.
pub fn crumb_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 _-]{0,31}").expect("Invalid regex")
}

/// Strategy for crumb states.
pub fn crumb_state_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["draft", "pending", "ready", "taken", "pebble", "dust", "archived"])
        .prop_map(str::to_string)
}

/// Strategy for crumb payloads (no id, no property values).
pub fn crumb_strategy() -> impl Strategy<Value = Crumb> {
    (crumb_name_strategy(), crumb_state_strategy()).prop_map(|(name, state)| Crumb {
        name,
        state,
        ..Default::default()
    })
}

/// Strategy for property value types.
pub fn value_type_strategy() -> impl Strategy<Value = ValueType> {
    prop::sample::select(ValueType::ALL.to_vec())
}

/// Strategy for property names, distinct from the built-in ones.
pub fn property_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("x_[a-z]{1,12}").expect("Invalid regex")
}

/// Strategy for one step of an interleaving of crumb creations and
/// property definitions.
#[derive(Debug, Clone)]
pub enum Step {
    /// Create a crumb.
    Crumb(Crumb),
    /// Define a property of the given type.
    Property(ValueType),
}

/// Strategy for a sequence of [`Step`]s.
pub fn steps_strategy(max_len: usize) -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        prop_oneof![
            crumb_strategy().prop_map(Step::Crumb),
            value_type_strategy().prop_map(Step::Property),
        ],
        1..max_len,
    )
}

/// Strategy for JSON scalars.
pub fn json_scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,16}".prop_map(Value::String),
    ]
}

/// Strategy for lines that are not JSON objects.
pub fn junk_line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("{".to_string()),
        Just("[1, 2, 3]".to_string()),
        Just("null".to_string()),
        Just("\"text\"".to_string()),
        "[a-z{}:,\" ]{1,40}".prop_filter("Must not be a JSON object", |s| {
            !matches!(serde_json::from_str::<Value>(s), Ok(Value::Object(_)))
        }),
    ]
}
