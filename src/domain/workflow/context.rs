//! Execution context shared by every step of a run
//!
//! The context is a JSON object. Steps contribute partial objects which are
//! merged recursively, so siblings can add keys under the same parent
//! without clobbering each other.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::StepId;

/// Key holding the ordered list of step outputs
pub const STEPS_KEY: &str = "steps";

/// Key holding the per-iteration data of a FOR_EACH loop
pub const LOOP_KEY: &str = "loop";

/// Key holding a copy of the context the run was started with
pub const TRIGGER_KEY: &str = "trigger";

/// Key holding variables written by DEFINE_VARIABLE steps
pub const VARIABLES_KEY: &str = "variables";

/// Key holding the evaluated result of CONDITION steps, by step id
pub const CONDITION_KEY: &str = "condition";

/// Mutable key-value state threaded through a workflow run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext(Map<String, Value>);

impl ExecutionContext {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a context from a JSON value; non-objects become `{"input": value}`
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::Null => Self::new(),
            other => {
                let mut map = Map::new();
                map.insert("input".to_string(), other);
                Self(map)
            }
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Point-in-time copy as a JSON value, used for log snapshots
    pub fn snapshot(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Recursively merge a partial context into this one
    pub fn merge(&mut self, partial: Map<String, Value>) {
        merge_maps(&mut self.0, partial);
    }

    /// Seed the `trigger` key with a copy of the current state when absent
    pub fn seed_trigger(&mut self) {
        if !self.0.contains_key(TRIGGER_KEY) {
            let copy = Value::Object(self.0.clone());
            self.0.insert(TRIGGER_KEY.to_string(), copy);
        }
    }

    /// Entries of the `steps` accumulator, empty when absent or malformed
    pub fn step_entries(&self) -> &[Value] {
        match self.0.get(STEPS_KEY) {
            Some(Value::Array(entries)) => entries,
            _ => &[],
        }
    }

    /// Record the parsed output of a successful step
    ///
    /// Appends `{step_id, output}` to `steps` and stores the output under
    /// `step_<id>` so later templates can address it by path.
    pub fn record_step_output(&mut self, step_id: &StepId, output: Value) {
        self.0
            .insert(format!("step_{}", step_id), output.clone());

        let entry = serde_json::json!({
            "step_id": step_id.as_str(),
            "output": output,
        });
        self.append_step_entries(vec![entry]);
    }

    /// Append already-built entries to the `steps` accumulator
    pub fn append_step_entries(&mut self, entries: Vec<Value>) {
        if entries.is_empty() {
            return;
        }

        let slot = self
            .0
            .entry(STEPS_KEY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(list) = slot {
            list.extend(entries);
        }
    }
}

impl From<Map<String, Value>> for ExecutionContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Recursively merge `incoming` into `target`
///
/// Objects merge key by key. Any other value, arrays included, replaces what
/// was there before.
pub fn deep_merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(partial)) => merge_maps(existing, partial),
        (slot, value) => *slot = value,
    }
}

fn merge_maps(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match target.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> ExecutionContext {
        ExecutionContext::from_value(value)
    }

    #[test]
    fn test_merge_is_recursive() {
        let mut context = ctx(json!({"a": {"x": 1}}));
        context.merge(json!({"a": {"y": 2}}).as_object().unwrap().clone());

        assert_eq!(context.snapshot(), json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn test_merge_replaces_scalars_and_arrays() {
        let mut target = json!({"a": {"list": [1, 2, 3], "name": "old"}, "b": 1});
        deep_merge(
            &mut target,
            json!({"a": {"list": [9], "name": "new"}, "b": {"nested": true}}),
        );

        assert_eq!(
            target,
            json!({"a": {"list": [9], "name": "new"}, "b": {"nested": true}})
        );
    }

    #[test]
    fn test_merge_deeply_nested() {
        let mut target = json!({"client": {"address": {"city": "Lyon"}, "name": "ACME"}});
        deep_merge(
            &mut target,
            json!({"client": {"address": {"zip": "69001"}}}),
        );

        assert_eq!(
            target,
            json!({"client": {"address": {"city": "Lyon", "zip": "69001"}, "name": "ACME"}})
        );
    }

    #[test]
    fn test_from_value_wraps_scalars() {
        assert_eq!(ctx(json!(null)).snapshot(), json!({}));
        assert_eq!(ctx(json!(5)).snapshot(), json!({"input": 5}));
    }

    #[test]
    fn test_seed_trigger_copies_initial_state_once() {
        let mut context = ctx(json!({"lead": {"id": 9}}));
        context.seed_trigger();
        context.insert("other", json!(true));
        context.seed_trigger();

        assert_eq!(context.get(TRIGGER_KEY), Some(&json!({"lead": {"id": 9}})));
    }

    #[test]
    fn test_record_step_output() {
        let mut context = ExecutionContext::new();
        context.record_step_output(&StepId::from("7"), json!({"text": "hello"}));
        context.record_step_output(&StepId::from("8"), json!(42));

        assert_eq!(context.get("step_7"), Some(&json!({"text": "hello"})));
        assert_eq!(
            context.step_entries(),
            &[
                json!({"step_id": "7", "output": {"text": "hello"}}),
                json!({"step_id": "8", "output": 42})
            ]
        );
    }

    #[test]
    fn test_append_replaces_malformed_steps_key() {
        let mut context = ctx(json!({"steps": "oops"}));
        context.append_step_entries(vec![json!(1)]);

        assert_eq!(context.get(STEPS_KEY), Some(&json!([1])));
    }

    #[test]
    fn test_append_nothing_leaves_context_untouched() {
        let mut context = ExecutionContext::new();
        context.append_step_entries(Vec::new());

        assert!(!context.contains_key(STEPS_KEY));
        assert!(context.step_entries().is_empty());
    }
}
