//! Condition rules and value predicates used by CONDITION steps

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::ExecutionContext;
use super::template::{resolve_value, strip_placeholder, templated_value, value_to_string};

/// A single comparison against a context path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionRule {
    /// Path of the value to test
    pub field: String,

    #[serde(default = "default_operator")]
    pub operator: ConditionOperator,

    /// Value to compare against; may hold placeholders
    #[serde(default)]
    pub value: Value,
}

fn default_operator() -> ConditionOperator {
    ConditionOperator::Eq
}

impl ConditionRule {
    pub fn new(field: impl Into<String>, operator: ConditionOperator) -> Self {
        Self {
            field: field.into(),
            operator,
            value: Value::Null,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Evaluate the rule; a missing field compares as `null`
    pub fn evaluate(&self, context: &ExecutionContext) -> bool {
        let field_value = resolve_value(strip_placeholder(&self.field), context)
            .cloned()
            .unwrap_or(Value::Null);
        let compare_value = templated_value(&self.value, context);

        self.operator.evaluate(&field_value, &compare_value)
    }
}

/// Condition comparison operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Equal to
    #[serde(alias = "==", alias = "=")]
    Eq,

    /// Not equal to
    #[serde(alias = "!=", alias = "<>")]
    Ne,

    /// Greater than
    #[serde(alias = ">")]
    Gt,

    /// Greater than or equal to
    #[serde(alias = ">=")]
    Gte,

    /// Less than
    #[serde(alias = "<")]
    Lt,

    /// Less than or equal to
    #[serde(alias = "<=")]
    Lte,

    /// Field is one of the listed values
    In,

    /// Field is none of the listed values
    NotIn,

    /// Field is truthy; the compare value is ignored
    Truthy,

    /// Is empty (for arrays/strings/null)
    IsEmpty,

    /// Is not empty
    IsNotEmpty,

    /// Contains (for strings/arrays)
    Contains,

    /// Starts with (for strings)
    StartsWith,

    /// Ends with (for strings)
    EndsWith,
}

impl ConditionOperator {
    /// Evaluate the condition
    pub fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        match self {
            Self::Eq => values_equal(field_value, compare_value),
            Self::Ne => !values_equal(field_value, compare_value),
            Self::Gt => compare_numbers(field_value, compare_value, |a, b| a > b),
            Self::Gte => compare_numbers(field_value, compare_value, |a, b| a >= b),
            Self::Lt => compare_numbers(field_value, compare_value, |a, b| a < b),
            Self::Lte => compare_numbers(field_value, compare_value, |a, b| a <= b),
            Self::In => is_member(field_value, compare_value),
            Self::NotIn => !is_member(field_value, compare_value),
            Self::Truthy => is_truthy(field_value),
            Self::IsEmpty => is_empty(field_value),
            Self::IsNotEmpty => !is_empty(field_value),
            Self::Contains => contains(field_value, compare_value),
            Self::StartsWith => starts_with(field_value, compare_value),
            Self::EndsWith => ends_with(field_value, compare_value),
        }
    }
}

/// Truthiness of a context value: non-empty, non-zero, non-false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
    }
}

/// Loose equality: scalars of different JSON types compare by their text
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => value_to_string(a) == value_to_string(b),
    }
}

/// Coerce a value to a number, accepting numeric strings
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare_numbers<F>(a: &Value, b: &Value, f: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (as_number(a), as_number(b)) {
        (Some(a), Some(b)) => f(a, b),
        _ => false,
    }
}

fn is_member(field: &Value, list: &Value) -> bool {
    match list {
        Value::Array(items) => items.iter().any(|item| values_equal(field, item)),
        _ => false,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(arr) => arr.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

fn contains(field: &Value, value: &Value) -> bool {
    match field {
        Value::String(s) => value.as_str().is_some_and(|v| s.contains(v)),
        Value::Array(arr) => arr.iter().any(|item| values_equal(item, value)),
        _ => false,
    }
}

fn starts_with(field: &Value, value: &Value) -> bool {
    match (field.as_str(), value.as_str()) {
        (Some(f), Some(v)) => f.starts_with(v),
        _ => false,
    }
}

fn ends_with(field: &Value, value: &Value) -> bool {
    match (field.as_str(), value.as_str()) {
        (Some(f), Some(v)) => f.ends_with(v),
        _ => false,
    }
}
