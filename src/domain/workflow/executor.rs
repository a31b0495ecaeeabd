//! Workflow executor trait and result types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::ExecutionContext;
use super::entity::{StepId, Workflow, WorkflowId, WorkflowStep};
use super::error::WorkflowError;

/// Terminal status of a step invocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
}

/// Outcome of a single step invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepOutcome {
    pub step_id: StepId,

    pub status: StepStatus,

    /// Wall-clock duration of the invocation
    pub duration_ms: u64,

    /// Error message if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the handler reported a non-fatal skip
    #[serde(default)]
    pub skipped: bool,

    /// Execution log entry recording this invocation
    pub execution_log_id: String,
}

impl StepOutcome {
    /// Create a successful outcome
    pub fn success(step_id: StepId, duration_ms: u64, execution_log_id: impl Into<String>) -> Self {
        Self {
            step_id,
            status: StepStatus::Success,
            duration_ms,
            error: None,
            skipped: false,
            execution_log_id: execution_log_id.into(),
        }
    }

    /// Create a failed outcome
    pub fn failure(
        step_id: StepId,
        error: impl Into<String>,
        duration_ms: u64,
        execution_log_id: impl Into<String>,
    ) -> Self {
        Self {
            step_id,
            status: StepStatus::Failed,
            duration_ms,
            error: Some(error.into()),
            skipped: false,
            execution_log_id: execution_log_id.into(),
        }
    }

    pub fn with_skipped(mut self, skipped: bool) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Summary of a top-level workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub workflow_id: WorkflowId,

    /// Outcome of each attempted top-level step, in execution order
    pub steps: Vec<StepOutcome>,

    /// Total execution time in milliseconds
    pub execution_time_ms: u64,

    /// Whether an `abort` error policy stopped the run early
    #[serde(default)]
    pub aborted: bool,

    /// Final state of the execution context
    pub context: Map<String, Value>,
}

impl RunSummary {
    /// Whether every attempted step succeeded
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(StepOutcome::is_success)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.is_failed())
    }

    pub fn outcome(&self, step_id: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step_id.as_str() == step_id)
    }
}

/// Result of running an explicit list of steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepsRun {
    pub outcomes: Vec<StepOutcome>,

    /// Whether a failing step with the `abort` policy stopped the list
    pub aborted: bool,
}

/// Trait for workflow execution
#[async_trait]
pub trait WorkflowExecutor: Send + Sync + std::fmt::Debug {
    /// Execute every top-level step of a workflow
    async fn execute(
        &self,
        workflow: &Workflow,
        context: ExecutionContext,
    ) -> Result<RunSummary, WorkflowError>;

    /// Execute a workflow starting at the given top-level step
    async fn execute_from(
        &self,
        workflow: &Workflow,
        context: ExecutionContext,
        start_step_id: &StepId,
    ) -> Result<RunSummary, WorkflowError>;

    /// Execute an explicit list of steps against a caller-owned context
    async fn execute_steps(
        &self,
        workflow_id: &WorkflowId,
        steps: &[WorkflowStep],
        context: &mut ExecutionContext,
    ) -> Vec<StepOutcome>;
}
