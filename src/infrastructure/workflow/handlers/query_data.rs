//! QUERY_DATA / FETCH_RECORDS handler

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{collaborator_error, config_error};
use crate::domain::workflow::{
    templated_value, ExecutionContext, NestedStepExecutor, StepHandler, StepResult,
    WorkflowError, WorkflowStep,
};
use crate::domain::{RecordFilter, RecordQuery, RecordStore};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

/// Loads records from the record store
///
/// Config:
/// - `model` (or `target_model`): entity type to read
/// - `conditions`: `[{field|column, op|operator, value}]`, values templated
/// - `order`: `[{field, dir: asc|desc}]`
/// - `limit`: 1..=1000, default 50
/// - `single` / `mode: single`: only the first match
/// - `count_only`: count every match without returning records
/// - `output_key`: also place the result at this context key
pub struct QueryDataHandler {
    store: Arc<dyn RecordStore>,
}

impl QueryDataHandler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

fn model(step: &WorkflowStep) -> Result<String, WorkflowError> {
    step.config_str("model")
        .or_else(|| step.config_str("target_model"))
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .ok_or_else(|| config_error(step.id(), "model is required for QUERY_DATA"))
}

fn text<'a>(entry: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn build_query(step: &WorkflowStep, context: &ExecutionContext) -> RecordQuery {
    let now = Utc::now();
    let mut query = RecordQuery::new();

    let conditions = step.config_value("conditions").and_then(Value::as_array);
    for entry in conditions.into_iter().flatten().filter_map(Value::as_object) {
        let Some(field) = text(entry, &["field", "column"]) else {
            continue;
        };
        let operator = text(entry, &["op", "operator"]).unwrap_or("=");
        let value = entry
            .get("value")
            .map(|raw| templated_value(raw, context))
            .unwrap_or(Value::Null);

        query = query.with_filter(RecordFilter::parse(field, operator, value, now));
    }

    let order = step.config_value("order").and_then(Value::as_array);
    for entry in order.into_iter().flatten().filter_map(Value::as_object) {
        if let Some(field) = text(entry, &["field"]) {
            let descending =
                text(entry, &["dir"]).is_some_and(|d| d.eq_ignore_ascii_case("desc"));
            query = query.order_by(field, descending);
        }
    }

    query
}

/// Configured limit, falling back to the default when out of range
fn limit(step: &WorkflowStep) -> usize {
    let configured = match step.config_value("limit") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };

    configured
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| (1..=MAX_LIMIT).contains(n))
        .unwrap_or(DEFAULT_LIMIT)
}

fn flag(step: &WorkflowStep, key: &str) -> bool {
    step.config_value(key).and_then(Value::as_bool).unwrap_or(false)
}

#[async_trait]
impl StepHandler for QueryDataHandler {
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        _executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        let model = model(step)?;
        let query = build_query(step, context);
        let single = flag(step, "single")
            || step
                .config_str("mode")
                .is_some_and(|m| m.trim().eq_ignore_ascii_case("single"));
        let count_only = flag(step, "count_only");

        let query = match (single, count_only) {
            (true, _) => query.with_limit(1),
            (false, true) => query,
            (false, false) => query.with_limit(limit(step)),
        };

        let records = self
            .store
            .query(&model, &query)
            .await
            .map_err(|e| collaborator_error(step.id(), e))?;

        debug!(
            step_id = %step.id(),
            model = %model,
            filters = query.filters.len(),
            matched = records.len(),
            "Records queried"
        );

        let parsed = if single {
            let record = records.into_iter().next();
            json!({
                "count": usize::from(record.is_some()),
                "records": record.iter().cloned().collect::<Vec<_>>(),
                "record": record,
            })
        } else if count_only {
            json!({ "count": records.len(), "records": [] })
        } else {
            json!({ "count": records.len(), "records": records })
        };

        let mut result = StepResult::completed(parsed.clone());
        if let Some(key) = step.config_str("output_key").map(str::trim).filter(|k| !k.is_empty()) {
            result = result.with_context(json!({ key: parsed }));
        }

        Ok(result)
    }
}
