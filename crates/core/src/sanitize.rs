//! Lossy normalization of arbitrary JSON metadata into storage-safe primitive values.
//!
//! Contract for each top-level value:
//!
//! | input                | output                                                    |
//! |----------------------|-----------------------------------------------------------|
//! | null, bool, number   | unchanged (`u64` above `i64::MAX` becomes text)           |
//! | string               | unchanged, subject to the length bound                    |
//! | list                 | primitive elements joined with `", "`, others dropped     |
//! | object               | compact JSON text, subject to the length bound            |
//!
//! The length bound: text longer than [`MAX_TEXT_CHARS`] is cut to [`TRUNCATED_CHARS`]
//! characters followed by [`CONTINUATION`]. Non-object input yields an empty map.

use crate::models::{Metadata, MetadataValue};
use serde_json::Value;
use tracing::{debug, warn};

pub const TRUNCATED_CHARS: usize = 450;
pub const CONTINUATION: &str = "...";
pub const MAX_TEXT_CHARS: usize = TRUNCATED_CHARS + 3;

pub fn sanitize_metadata(raw: &Value) -> Metadata {
    let Some(object) = raw.as_object() else {
        warn!(found = json_type_name(raw), "metadata is not an object, dropping it");
        return Metadata::new();
    };

    object
        .iter()
        .map(|(key, value)| (key.clone(), sanitize_value(key, value)))
        .collect()
}

fn sanitize_value(key: &str, value: &Value) -> MetadataValue {
    match value {
        Value::Null => MetadataValue::Null,
        Value::Bool(flag) => MetadataValue::Bool(*flag),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                MetadataValue::Integer(integer)
            } else if number.is_u64() {
                debug!(key, "unsigned metadata value exceeds i64, stored as text");
                MetadataValue::Text(bounded(number.to_string()))
            } else {
                number
                    .as_f64()
                    .map(MetadataValue::Float)
                    .unwrap_or_else(|| MetadataValue::Text(bounded(number.to_string())))
            }
        }
        Value::String(text) => MetadataValue::Text(bounded(text.clone())),
        Value::Array(items) => MetadataValue::Text(bounded(join_primitives(items))),
        Value::Object(_) => {
            debug!(key, "metadata value was an object, serialized to text");
            let serialized = serde_json::to_string(value).unwrap_or_else(|_| value.to_string());
            MetadataValue::Text(bounded(serialized))
        }
    }
}

/// Joins the primitive elements of a list. Nulls, lists and objects are dropped.
pub fn join_primitives(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Applies the 450/453 character bound.
pub fn bounded(text: String) -> String {
    if text.chars().count() <= MAX_TEXT_CHARS {
        return text;
    }
    let mut cut = text.chars().take(TRUNCATED_CHARS).collect::<String>();
    cut.push_str(CONTINUATION);
    cut
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
