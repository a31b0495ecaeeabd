//! CONDITION handler

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::config_error;
use crate::domain::workflow::{
    is_truthy, resolve_value, strip_placeholder, ConditionRule, ExecutionContext,
    NestedStepExecutor, StepHandler, StepResult, WorkflowError, WorkflowStep, CONDITION_KEY,
};

/// Child config keys selecting the branch a child belongs to
const BRANCH_KEYS: [&str; 2] = ["when", "_branch"];

/// Evaluates a condition and runs the matching branch of its children
///
/// The condition is the truthiness of `field` and/or every entry of `rules`.
/// Children carry a `when` flag (default true); the matching ones run on the
/// same context, so whatever they merge is visible to the following steps.
pub struct ConditionHandler;

impl ConditionHandler {
    fn evaluate(step: &WorkflowStep, context: &ExecutionContext) -> Result<bool, WorkflowError> {
        let field = step
            .config_str("field")
            .map(str::trim)
            .filter(|f| !f.is_empty());
        let rules = parse_rules(step)?;

        if field.is_none() && rules.is_empty() {
            return Err(config_error(
                step.id(),
                "Condition requires a field or at least one rule",
            ));
        }

        let field_holds = field.map_or(true, |path| {
            resolve_value(strip_placeholder(path), context).is_some_and(is_truthy)
        });

        Ok(field_holds && rules.iter().all(|rule| rule.evaluate(context)))
    }
}

fn parse_rules(step: &WorkflowStep) -> Result<Vec<ConditionRule>, WorkflowError> {
    match step.config_value("rules") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(rules) => serde_json::from_value(rules.clone())
            .map_err(|e| config_error(step.id(), format!("Invalid condition rules: {}", e))),
    }
}

/// Branch a child step belongs to; children without a marker run on `true`
fn branch_of(child: &WorkflowStep) -> bool {
    let marker = BRANCH_KEYS
        .iter()
        .find_map(|key| child.config_value(key).filter(|v| !v.is_null()));

    match marker {
        None => true,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !matches!(
            s.trim().to_lowercase().as_str(),
            "no" | "false" | "0" | "else"
        ),
        Some(other) => is_truthy(other),
    }
}

#[async_trait]
impl StepHandler for ConditionHandler {
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        let result = Self::evaluate(step, context)?;

        let branch: Vec<WorkflowStep> = step
            .ordered_children()
            .into_iter()
            .filter(|child| branch_of(child) == result)
            .collect();

        debug!(
            step_id = %step.id(),
            result,
            branch_steps = branch.len(),
            "Condition evaluated"
        );

        let executed = if branch.is_empty() {
            0
        } else {
            executor.execute_steps(&branch, context).await?.outcomes.len()
        };

        Ok(StepResult::completed(json!({
            "condition": if result { "YES" } else { "NO" },
            "result": result,
            "executed": executed,
        }))
        .with_context(json!({ CONDITION_KEY: { step.id().as_str(): result } })))
    }
}
