//! FOR_EACH handler

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::config_error;
use crate::domain::workflow::{
    resolve_value, strip_placeholder, ExecutionContext, NestedStepExecutor, StepHandler,
    StepResult, WorkflowError, WorkflowStep, LOOP_KEY,
};

const SOURCE_KEY: &str = "sourceArray";

/// Runs the children once per element of a context array
///
/// Each iteration works on a copy of the context holding
/// `loop = {item, index, is_first, is_last}`. Only the `steps` entries an
/// iteration appends flow back to the caller, in iteration order. A failing
/// child never stops the loop.
pub struct ForEachHandler;

/// Outcome of resolving the source path
enum Source {
    Items(Vec<Value>),
    Unusable(String),
}

fn resolve_source(path: &str, context: &ExecutionContext) -> Source {
    match resolve_value(path, context) {
        None => Source::Unusable(format!("Source array '{}' not found in context", path)),
        Some(Value::Array(items)) => Source::Items(items.clone()),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => Source::Items(items),
            _ => Source::Unusable(format!("Source '{}' is not an array", path)),
        },
        Some(_) => Source::Unusable(format!("Source '{}' is not an array", path)),
    }
}

fn loop_metadata(item: Value, index: usize, count: usize) -> Value {
    json!({
        "item": item,
        "index": index,
        "is_first": index == 0,
        "is_last": index + 1 == count,
    })
}

#[async_trait]
impl StepHandler for ForEachHandler {
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        let path = step
            .config_str(SOURCE_KEY)
            .map(|p| strip_placeholder(p).trim())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| config_error(step.id(), "sourceArray is required"))?
            .to_string();

        let items = match resolve_source(&path, context) {
            Source::Items(items) => items,
            Source::Unusable(reason) => {
                debug!(step_id = %step.id(), reason = %reason, "Skipping loop");
                return Ok(StepResult::skipped(reason));
            }
        };

        let children = step.ordered_children();
        let count = items.len();
        let mut failed_steps = 0;

        for (index, item) in items.into_iter().enumerate() {
            let mut iteration = context.clone();
            iteration.insert(LOOP_KEY, loop_metadata(item, index, count));
            let before = iteration.step_entries().len();

            let run = executor.execute_steps(&children, &mut iteration).await?;
            failed_steps += run.outcomes.iter().filter(|o| o.is_failed()).count();

            let produced = iteration
                .step_entries()
                .get(before..)
                .map(<[Value]>::to_vec)
                .unwrap_or_default();
            context.append_step_entries(produced);
        }

        debug!(step_id = %step.id(), iterations = count, failed_steps, "Loop finished");

        Ok(StepResult::completed(json!({
            "iterations": count,
            "failed_steps": failed_steps,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::{
        HandlerRegistry, RunSummary, Workflow, WorkflowExecutor, WorkflowId, STEPS_KEY,
    };
    use crate::infrastructure::execution_log::InMemoryExecutionLogStore;
    use crate::infrastructure::workflow::engine::WorkflowEngine;
    use crate::infrastructure::workflow::handlers::test_support::NoNesting;
    use std::sync::Arc;

    /// Outputs the current loop metadata
    struct LoopReporter;

    #[async_trait]
    impl StepHandler for LoopReporter {
        async fn handle(
            &self,
            context: &mut ExecutionContext,
            step: &WorkflowStep,
            _executor: &dyn NestedStepExecutor,
        ) -> Result<StepResult, WorkflowError> {
            let current = context.get(LOOP_KEY).cloned().unwrap_or(Value::Null);
            if current["item"] == json!("boom") {
                return Err(WorkflowError::step_execution(step.id().as_str(), "boom"));
            }
            Ok(StepResult::completed(current))
        }
    }

    async fn run(source: Value, initial: Value) -> RunSummary {
        let registry = HandlerRegistry::new()
            .with_handler("FOR_EACH", Arc::new(ForEachHandler))
            .with_handler("REPORT", Arc::new(LoopReporter));
        let engine = WorkflowEngine::new(
            Arc::new(registry),
            Arc::new(InMemoryExecutionLogStore::new()),
        );
        let workflow = Workflow::new(WorkflowId::new("loop-test").unwrap(), "Loop").with_step(
            WorkflowStep::new("1", "FOR_EACH")
                .with_config(json!({ "sourceArray": source }))
                .with_children(vec![WorkflowStep::new("2", "REPORT")]),
        );

        engine
            .execute(&workflow, ExecutionContext::from_value(initial))
            .await
            .unwrap()
    }

    fn step_outputs(summary: &RunSummary, step_id: &str) -> Vec<Value> {
        summary.context[STEPS_KEY]
            .as_array()
            .unwrap()
            .iter()
            .filter(|e| e["step_id"] == json!(step_id))
            .map(|e| e["output"].clone())
            .collect()
    }

    #[tokio::test]
    async fn test_iterations_run_in_order_with_metadata() {
        let summary = run(json!("{{ letters }}"), json!({"letters": ["a", "b", "c"]})).await;

        let outputs = step_outputs(&summary, "2");
        let items: Vec<Value> = outputs.iter().map(|o| o["item"].clone()).collect();
        assert_eq!(items, vec![json!("a"), json!("b"), json!("c")]);

        assert_eq!(outputs[0]["is_first"], json!(true));
        assert_eq!(outputs[0]["is_last"], json!(false));
        assert_eq!(outputs[2]["is_first"], json!(false));
        assert_eq!(outputs[2]["is_last"], json!(true));
        assert_eq!(outputs[1]["index"], json!(1));

        assert_eq!(
            step_outputs(&summary, "1"),
            vec![json!({"iterations": 3, "failed_steps": 0})]
        );
        assert!(!summary.context.contains_key(LOOP_KEY));
        assert!(summary.is_success());
    }

    #[tokio::test]
    async fn test_failing_iteration_does_not_stop_loop() {
        let summary = run(json!("items"), json!({"items": ["a", "boom", "c"]})).await;

        let items: Vec<Value> = step_outputs(&summary, "2")
            .into_iter()
            .map(|o| o["item"].clone())
            .collect();
        assert_eq!(items, vec![json!("a"), json!("c")]);
        assert_eq!(
            step_outputs(&summary, "1"),
            vec![json!({"iterations": 3, "failed_steps": 1})]
        );
    }

    #[tokio::test]
    async fn test_json_string_source_is_decoded() {
        let summary = run(json!("payload.ids"), json!({"payload": {"ids": "[1, 2]"}})).await;

        assert_eq!(step_outputs(&summary, "2").len(), 2);
    }

    #[tokio::test]
    async fn test_non_array_source_is_skipped() {
        for initial in [json!({"items": "plain"}), json!({"items": 3}), json!({})] {
            let mut context = ExecutionContext::from_value(initial);
            context.append_step_entries(vec![json!({"step_id": "0", "output": 1})]);
            let before = context.clone();
            let step = WorkflowStep::new("1", "FOR_EACH")
                .with_config(json!({"sourceArray": "items"}))
                .with_children(vec![WorkflowStep::new("2", "REPORT")]);

            let result = ForEachHandler
                .handle(&mut context, &step, &NoNesting)
                .await
                .unwrap();

            assert!(result.skipped);
            assert_eq!(context, before);
        }
    }

    #[tokio::test]
    async fn test_skipped_loop_leaves_steps_unchanged() {
        let summary = run(json!("missing.path"), json!({})).await;

        assert!(summary.is_success());
        assert!(summary.steps[0].skipped);
        assert!(!summary.context.contains_key(STEPS_KEY));
    }

    #[tokio::test]
    async fn test_missing_source_config_fails() {
        let step = WorkflowStep::new("1", "FOR_EACH");
        let err = ForEachHandler
            .handle(&mut ExecutionContext::new(), &step, &NoNesting)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            WorkflowError::step_execution("1", "sourceArray is required")
        );
    }
}
