//! DEFINE_VARIABLE handler

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::domain::workflow::{
    templated_value, ExecutionContext, NestedStepExecutor, StepHandler, StepResult, WorkflowError,
    WorkflowStep, VARIABLES_KEY,
};

/// Writes named values under `variables` so later steps can use
/// `{{ variables.<name> }}`
///
/// `variables` is either a list of `{name, value}` entries or an object.
/// Entries with a blank name are ignored.
pub struct DefineVariableHandler;

fn collect_variables(config: Option<&Value>, context: &ExecutionContext) -> Map<String, Value> {
    let mut variables = Map::new();

    let mut define = |name: &str, value: &Value| {
        let name = name.trim();
        if !name.is_empty() {
            variables.insert(name.to_string(), templated_value(value, context));
        }
    };

    match config {
        Some(Value::Array(entries)) => {
            for entry in entries {
                if let Some(name) = entry.get("name").and_then(Value::as_str) {
                    define(name, entry.get("value").unwrap_or(&Value::Null));
                }
            }
        }
        Some(Value::Object(map)) => {
            for (name, value) in map {
                define(name, value);
            }
        }
        _ => {}
    }

    variables
}

#[async_trait]
impl StepHandler for DefineVariableHandler {
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        _executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        let variables = collect_variables(step.config_value("variables"), context);

        Ok(StepResult::completed(Value::Object(variables.clone()))
            .with_context(json!({ VARIABLES_KEY: variables })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::workflow::handlers::test_support::NoNesting;

    #[tokio::test]
    async fn test_define_variables_from_list() {
        let step = WorkflowStep::new("2", "DEFINE_VARIABLE").with_config(json!({
            "variables": [
                {"name": "greeting", "value": "Hello {{ lead.name }}"},
                {"name": "tags", "value": "{{ lead.tags }}"},
                {"name": " ", "value": "ignored"},
                {"value": "ignored"}
            ]
        }));
        let mut context =
            ExecutionContext::from_value(json!({"lead": {"name": "Ada", "tags": ["vip"]}}));

        let result = DefineVariableHandler
            .handle(&mut context, &step, &NoNesting)
            .await
            .unwrap();

        assert_eq!(result.parsed, json!({"greeting": "Hello Ada", "tags": ["vip"]}));
        assert_eq!(
            result.context.get(VARIABLES_KEY),
            Some(&json!({"greeting": "Hello Ada", "tags": ["vip"]}))
        );
    }

    #[tokio::test]
    async fn test_define_variables_from_object() {
        let step = WorkflowStep::new("2", "DEFINE_VARIABLE")
            .with_config(json!({"variables": {"limit": 5, "missing": "{{ nope }}"}}));
        let mut context = ExecutionContext::new();

        let result = DefineVariableHandler
            .handle(&mut context, &step, &NoNesting)
            .await
            .unwrap();

        assert_eq!(result.parsed, json!({"limit": 5, "missing": null}));
    }

    #[tokio::test]
    async fn test_no_variables_defines_nothing() {
        let step = WorkflowStep::new("2", "DEFINE_VARIABLE");
        let result = DefineVariableHandler
            .handle(&mut ExecutionContext::new(), &step, &NoNesting)
            .await
            .unwrap();

        assert_eq!(result.parsed, json!({}));
    }
}
