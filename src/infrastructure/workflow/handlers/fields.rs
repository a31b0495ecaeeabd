//! Field mapping helpers for the record action handlers

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::domain::workflow::{templated_value, ExecutionContext};

/// Keys accepted as the column name of a field mapping entry
const FIELD_NAME_KEYS: [&str; 3] = ["column", "field", "name"];

/// Resolve a `fields` config value into a record payload
///
/// Accepts a list of `{column|field|name, value}` entries or a plain object.
/// Values are templated against the context and then passed through
/// [`apply_field_function`]. Entries without a name are ignored.
pub fn resolve_fields(config: Option<&Value>, context: &ExecutionContext) -> Map<String, Value> {
    let mut resolved = Map::new();

    match config {
        Some(Value::Array(entries)) => {
            for entry in entries {
                let Some(name) = field_name(entry) else {
                    continue;
                };
                let value = entry.get("value").cloned().unwrap_or(Value::Null);
                resolved.insert(name, resolve_field_value(&value, context));
            }
        }
        Some(Value::Object(map)) => {
            for (name, value) in map {
                if name.trim().is_empty() {
                    continue;
                }
                resolved.insert(name.trim().to_string(), resolve_field_value(value, context));
            }
        }
        _ => {}
    }

    resolved
}

fn field_name(entry: &Value) -> Option<String> {
    FIELD_NAME_KEYS
        .iter()
        .filter_map(|key| entry.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string)
}

fn resolve_field_value(value: &Value, context: &ExecutionContext) -> Value {
    apply_field_function(templated_value(value, context))
}

/// Expand the value functions understood in record fields
///
/// `NOW()`, `CURRENT_TIMESTAMP` and `TODAY()` become RFC 3339 timestamps and
/// `NULL` becomes null. Matching is case-insensitive; anything else is
/// returned unchanged.
pub fn apply_field_function(value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };

    match text.trim().to_uppercase().as_str() {
        "NOW()" | "CURRENT_TIMESTAMP" | "CURRENT_TIMESTAMP()" => {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
        }
        "TODAY()" => {
            let midnight = Utc::now()
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true));
            midnight.map(Value::String).unwrap_or(value)
        }
        "NULL" => Value::Null,
        _ => value,
    }
}
