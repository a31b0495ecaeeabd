//! Generic ACTION handler

use async_trait::async_trait;
use tracing::info;

use crate::domain::workflow::{
    ExecutionContext, NestedStepExecutor, StepHandler, StepResult, WorkflowError, WorkflowStep,
};

/// Fallback for ACTION steps without an `action_type`; records a log line only
pub struct GenericActionHandler;

#[async_trait]
impl StepHandler for GenericActionHandler {
    async fn handle(
        &self,
        _context: &mut ExecutionContext,
        step: &WorkflowStep,
        _executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        info!(step_id = %step.id(), "Generic action step has no action_type, nothing to do");

        Ok(StepResult::empty().with_log(format!("Action step {} has no action_type", step.id())))
    }
}
