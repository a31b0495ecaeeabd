//! Template resolution against the execution context
//!
//! Placeholders use the `{{ path }}` syntax. A path is split on `.` or `:`
//! and walked from the context root through objects only; sequences cannot
//! be indexed and must be iterated with a FOR_EACH step instead.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::context::ExecutionContext;

/// Matches a `{{ path }}` placeholder anywhere in a string
static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").unwrap());

/// Matches a string made of exactly one placeholder
static SINGLE_PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\{\{\s*([^}]+?)\s*\}\}\s*$").unwrap());

/// Resolve a raw value by path, preserving its type
///
/// Returns `None` when any segment is missing or traversal reaches a
/// non-object value.
pub fn resolve_value<'a>(path: &str, context: &'a ExecutionContext) -> Option<&'a Value> {
    resolve_in_map(path, context.as_map())
}

/// Same as [`resolve_value`] over a bare JSON object
pub fn resolve_in_map<'a>(path: &str, root: &'a Map<String, Value>) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let mut segments = path.split(['.', ':']);
    let first = segments.next()?;
    let mut current = root.get(first)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Substitute every `{{ path }}` placeholder in `text`
///
/// Scalars are stringified, objects and arrays are JSON-encoded, and
/// unresolvable paths become the empty string.
pub fn resolve_template(text: &str, context: &ExecutionContext) -> String {
    render_with(text, context.as_map())
}

/// Same as [`resolve_template`] over a bare JSON object
pub fn render_with(text: &str, root: &Map<String, Value>) -> String {
    PLACEHOLDER_PATTERN
        .replace_all(text, |caps: &regex::Captures<'_>| {
            resolve_in_map(&caps[1], root)
                .map(value_to_string)
                .unwrap_or_default()
        })
        .into_owned()
}

/// Apply templating to a configuration value
///
/// A string that is exactly one placeholder yields the raw resolved value
/// (`null` when missing). Other strings are interpolated; arrays and objects
/// are templated element by element; remaining scalars pass through.
pub fn templated_value(value: &Value, context: &ExecutionContext) -> Value {
    match value {
        Value::String(text) => {
            if let Some(caps) = SINGLE_PLACEHOLDER_PATTERN.captures(text) {
                return resolve_value(&caps[1], context)
                    .cloned()
                    .unwrap_or(Value::Null);
            }
            Value::String(resolve_template(text, context))
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| templated_value(item, context))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), templated_value(item, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Accept `{{ path }}` wherever a bare path is expected
pub fn strip_placeholder(path: &str) -> &str {
    match SINGLE_PLACEHOLDER_PATTERN.captures(path) {
        Some(caps) => caps.get(1).map_or(path, |m| m.as_str()),
        None => path.trim(),
    }
}

/// Check whether a string contains any placeholder
pub fn has_placeholders(text: &str) -> bool {
    PLACEHOLDER_PATTERN.is_match(text)
}

/// Convert a JSON value to its substitution text
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),

        // For arrays and objects, use JSON representation
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
