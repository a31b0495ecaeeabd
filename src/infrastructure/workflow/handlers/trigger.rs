//! TRIGGER handler

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::workflow::{
    ExecutionContext, NestedStepExecutor, StepHandler, StepResult, WorkflowError, WorkflowStep,
    TRIGGER_KEY,
};

/// Config keys naming the event a trigger fires on
const EVENT_KEYS: [&str; 2] = ["trigger_event", "event"];

/// Marks the entry point of a workflow
///
/// The trigger payload is already seeded into the context by the engine, so
/// the step only reports which event started the run.
pub struct TriggerHandler;

#[async_trait]
impl StepHandler for TriggerHandler {
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        _executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        let event = EVENT_KEYS
            .iter()
            .find_map(|key| step.config_value(key).filter(|v| !v.is_null()).cloned())
            .or_else(|| {
                context
                    .get(TRIGGER_KEY)
                    .and_then(|trigger| trigger.get("event"))
                    .cloned()
            })
            .unwrap_or(Value::Null);

        Ok(StepResult::completed(json!({ "trigger_event": event })))
    }
}
