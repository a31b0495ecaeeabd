//! Record queries run by QUERY_DATA steps

use std::cmp::Ordering;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};

use crate::domain::workflow::template::{resolve_in_map, value_to_string};
use crate::domain::workflow::ConditionOperator;

/// How a filter tests a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Compare(ConditionOperator),
    IsNull,
    IsNotNull,
    /// RFC 3339 timestamp strictly before the filter value
    Before,
    /// RFC 3339 timestamp at or after the filter value
    AtOrAfter,
}

/// A single filter on a record field
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFilter {
    /// Dotted path into the record
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl RecordFilter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Build a filter from a loosely written operator
    ///
    /// `in` and `not in` accept a comma separated string. The time window
    /// operators (`older_than_hours`, `within_hours`, `older_than_days`,
    /// `within_days`) turn their numeric value into a cutoff before `now`.
    /// Unknown operators compare for equality.
    pub fn parse(
        field: impl Into<String>,
        operator: &str,
        value: Value,
        now: DateTime<Utc>,
    ) -> Self {
        let cutoff = |hours: i64| {
            let at = TimeDelta::try_hours(hours)
                .and_then(|delta| now.checked_sub_signed(delta))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            Value::String(at.to_rfc3339())
        };

        let days = |value: &Value| whole(value).saturating_mul(24);

        let (operator, value) = match operator.trim().to_lowercase().as_str() {
            "is null" | "is_null" | "null" => (FilterOperator::IsNull, Value::Null),
            "is not null" | "is_not_null" | "not null" | "not_null" => {
                (FilterOperator::IsNotNull, Value::Null)
            }
            "in" => (FilterOperator::Compare(ConditionOperator::In), list(value)),
            "not in" | "not_in" => {
                (FilterOperator::Compare(ConditionOperator::NotIn), list(value))
            }
            "older_than_hours" => (FilterOperator::Before, cutoff(whole(&value))),
            "within_hours" => (FilterOperator::AtOrAfter, cutoff(whole(&value))),
            "older_than_days" => (FilterOperator::Before, cutoff(days(&value))),
            "within_days" => (FilterOperator::AtOrAfter, cutoff(days(&value))),
            other => {
                let op = serde_json::from_value(Value::String(other.to_string()))
                    .unwrap_or(ConditionOperator::Eq);
                (FilterOperator::Compare(op), value)
            }
        };

        Self::new(field, operator, value)
    }

    /// Test the filter; a missing field reads as `null`
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        let field = resolve_in_map(&self.field, record).unwrap_or(&Value::Null);

        match self.operator {
            FilterOperator::Compare(op) => op.evaluate(field, &self.value),
            FilterOperator::IsNull => field.is_null(),
            FilterOperator::IsNotNull => !field.is_null(),
            FilterOperator::Before => {
                compare_timestamps(field, &self.value) == Some(Ordering::Less)
            }
            FilterOperator::AtOrAfter => matches!(
                compare_timestamps(field, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

/// Sort key of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOrder {
    pub field: String,
    pub descending: bool,
}

/// Filters, ordering and limit applied to one entity type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub filters: Vec<RecordFilter>,
    pub order: Vec<RecordOrder>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order.push(RecordOrder {
            field: field.into(),
            descending,
        });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        self.filters.iter().all(|filter| filter.matches(record))
    }

    /// Filter, sort and truncate records; ties keep their input order
    pub fn apply(&self, records: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
        let mut matched: Vec<_> = records.into_iter().filter(|r| self.matches(r)).collect();

        if !self.order.is_empty() {
            matched.sort_by(|a, b| self.compare(a, b));
        }
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }

        matched
    }

    fn compare(&self, a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
        for key in &self.order {
            let left = resolve_in_map(&key.field, a).unwrap_or(&Value::Null);
            let right = resolve_in_map(&key.field, b).unwrap_or(&Value::Null);
            let ordering = compare_values(left, right);
            let ordering = if key.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// `null` first, numbers numerically, everything else by text
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => value_to_string(a).cmp(&value_to_string(b)),
    }
}

fn compare_timestamps(a: &Value, b: &Value) -> Option<Ordering> {
    let a = DateTime::parse_from_rfc3339(a.as_str()?).ok()?;
    let b = DateTime::parse_from_rfc3339(b.as_str()?).ok()?;
    Some(a.cmp(&b))
}

/// Comma separated text becomes a list; lists pass through
fn list(value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        Value::String(text) => Value::Array(
            text.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ),
        Value::Null => Value::Array(Vec::new()),
        other => Value::Array(vec![other]),
    }
}

fn whole(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}
