//! Step handler contract

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::context::ExecutionContext;
use super::entity::WorkflowStep;
use super::error::WorkflowError;
use super::executor::StepsRun;

/// Value returned by a handler for one step invocation
///
/// Only `context` feeds back into the running context; everything else is
/// captured in the execution log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResult {
    pub raw: Value,
    pub parsed: Value,

    /// Partial context merged recursively after the step succeeds
    pub context: Map<String, Value>,

    /// Free-form diagnostic lines
    pub logs: Vec<String>,

    pub token_usage: Option<u64>,
    pub cost: Option<f64>,

    /// Non-fatal skip; the step still counts as successful
    pub skipped: bool,
}

impl StepResult {
    /// Result carrying the same value as raw and parsed output
    pub fn completed(output: Value) -> Self {
        Self {
            raw: output.clone(),
            parsed: output,
            ..Default::default()
        }
    }

    /// Result with distinct raw and parsed outputs
    pub fn new(raw: Value, parsed: Value) -> Self {
        Self {
            raw,
            parsed,
            ..Default::default()
        }
    }

    /// Non-fatal skip with a diagnostic message
    pub fn skipped(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let output = serde_json::json!({ "skipped": true, "reason": reason });
        Self {
            raw: output.clone(),
            parsed: output,
            logs: vec![reason],
            skipped: true,
            ..Default::default()
        }
    }

    /// Structural no-op with no output
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the partial context; non-object values are ignored
    pub fn with_context(mut self, context: Value) -> Self {
        if let Value::Object(map) = context {
            self.context = map;
        }
        self
    }

    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    pub fn with_token_usage(mut self, tokens: u64) -> Self {
        self.token_usage = Some(tokens);
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// Entry point handlers use to run child steps
///
/// Implemented by the engine for the duration of one invocation; it carries
/// the workflow id, the enclosing execution log and the nesting depth so
/// nested logs link to their parent.
#[async_trait]
pub trait NestedStepExecutor: Send + Sync {
    async fn execute_steps(
        &self,
        steps: &[WorkflowStep],
        context: &mut ExecutionContext,
    ) -> Result<StepsRun, WorkflowError>;
}

/// Handler for one step type
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Execute a step against the running context
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError>;
}
