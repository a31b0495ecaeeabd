//! Execution log domain entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::workflow::{StepId, WorkflowId};

/// Execution log ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionLogId(String);

impl ExecutionLogId {
    pub fn new(id: impl Into<String>) -> Result<Self, ExecutionLogError> {
        let id = id.into();
        validate_execution_log_id(&id)?;
        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(format!("log-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExecutionLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a step invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Started,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Started => "started",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Started)
    }
}

/// Fields written when a log entry reaches its terminal status
#[derive(Debug, Clone, PartialEq)]
pub enum LogCompletion {
    Success {
        raw_output: Value,
        parsed_output: Value,
        duration_ms: u64,
        token_usage: Option<u64>,
        cost: Option<f64>,
    },
    Failed {
        error_message: String,
        duration_ms: u64,
    },
}

impl LogCompletion {
    pub fn success(raw_output: Value, parsed_output: Value, duration_ms: u64) -> Self {
        Self::Success {
            raw_output,
            parsed_output,
            duration_ms,
            token_usage: None,
            cost: None,
        }
    }

    pub fn failed(error_message: impl Into<String>, duration_ms: u64) -> Self {
        Self::Failed {
            error_message: error_message.into(),
            duration_ms,
        }
    }

    /// Attach token and cost accounting to a success completion
    pub fn with_accounting(mut self, tokens: Option<u64>, amount: Option<f64>) -> Self {
        if let Self::Success {
            token_usage, cost, ..
        } = &mut self
        {
            *token_usage = tokens;
            *cost = amount;
        }
        self
    }

    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::Success { .. } => ExecutionStatus::Success,
            Self::Failed { .. } => ExecutionStatus::Failed,
        }
    }
}

/// Audit record of one step invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    id: ExecutionLogId,
    workflow_id: WorkflowId,
    step_id: StepId,
    step_type: String,
    /// Enclosing invocation for steps run by CONDITION or FOR_EACH
    parent_execution_log_id: Option<ExecutionLogId>,
    status: ExecutionStatus,
    input_context: Value,
    raw_output: Option<Value>,
    parsed_output: Option<Value>,
    duration_ms: Option<u64>,
    token_usage: Option<u64>,
    cost: Option<f64>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ExecutionLog {
    /// Open a log entry for an invocation that is about to run
    pub fn started(
        workflow_id: WorkflowId,
        step_id: StepId,
        step_type: impl Into<String>,
        input_context: Value,
    ) -> Self {
        Self {
            id: ExecutionLogId::generate(),
            workflow_id,
            step_id,
            step_type: step_type.into(),
            parent_execution_log_id: None,
            status: ExecutionStatus::Started,
            input_context,
            raw_output: None,
            parsed_output: None,
            duration_ms: None,
            token_usage: None,
            cost: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_parent(mut self, parent: Option<ExecutionLogId>) -> Self {
        self.parent_execution_log_id = parent;
        self
    }

    // Getters

    pub fn id(&self) -> &ExecutionLogId {
        &self.id
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn step_id(&self) -> &StepId {
        &self.step_id
    }

    pub fn step_type(&self) -> &str {
        &self.step_type
    }

    pub fn parent_execution_log_id(&self) -> Option<&ExecutionLogId> {
        self.parent_execution_log_id.as_ref()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn input_context(&self) -> &Value {
        &self.input_context
    }

    pub fn raw_output(&self) -> Option<&Value> {
        self.raw_output.as_ref()
    }

    pub fn parsed_output(&self) -> Option<&Value> {
        self.parsed_output.as_ref()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    pub fn token_usage(&self) -> Option<u64> {
        self.token_usage
    }

    pub fn cost(&self) -> Option<f64> {
        self.cost
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Move the entry to its terminal status
    ///
    /// A terminal entry is never mutated again.
    pub fn complete(&mut self, completion: LogCompletion) -> Result<(), ExecutionLogError> {
        if self.status.is_terminal() {
            return Err(ExecutionLogError::AlreadyCompleted(self.id.to_string()));
        }

        self.status = completion.status();
        match completion {
            LogCompletion::Success {
                raw_output,
                parsed_output,
                duration_ms,
                token_usage,
                cost,
            } => {
                self.raw_output = Some(raw_output);
                self.parsed_output = Some(parsed_output);
                self.duration_ms = Some(duration_ms);
                self.token_usage = token_usage;
                self.cost = cost;
            }
            LogCompletion::Failed {
                error_message,
                duration_ms,
            } => {
                self.error_message = Some(error_message);
                self.duration_ms = Some(duration_ms);
            }
        }
        self.completed_at = Some(Utc::now());

        Ok(())
    }
}

/// Execution log errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionLogError {
    #[error("Invalid execution log ID: {0}")]
    InvalidId(String),

    #[error("Execution log '{0}' is already completed")]
    AlreadyCompleted(String),
}

impl From<ExecutionLogError> for DomainError {
    fn from(err: ExecutionLogError) -> Self {
        match err {
            ExecutionLogError::InvalidId(_) => DomainError::validation(err.to_string()),
            ExecutionLogError::AlreadyCompleted(_) => DomainError::conflict(err.to_string()),
        }
    }
}

fn validate_execution_log_id(id: &str) -> Result<(), ExecutionLogError> {
    if id.is_empty() {
        return Err(ExecutionLogError::InvalidId(
            "ID cannot be empty".to_string(),
        ));
    }

    if id.len() > 64 {
        return Err(ExecutionLogError::InvalidId(
            "ID cannot exceed 64 characters".to_string(),
        ));
    }

    Ok(())
}

/// Query parameters for listing execution logs
#[derive(Debug, Clone, Default)]
pub struct ExecutionLogQuery {
    pub workflow_id: Option<WorkflowId>,
    pub step_id: Option<StepId>,
    pub status: Option<ExecutionStatus>,
    pub parent_execution_log_id: Option<ExecutionLogId>,
    /// Only entries without a parent
    pub top_level_only: bool,
    pub limit: Option<usize>,
}

impl ExecutionLogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow_id(mut self, workflow_id: WorkflowId) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    pub fn with_step_id(mut self, step_id: impl Into<StepId>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_parent(mut self, parent: ExecutionLogId) -> Self {
        self.parent_execution_log_id = Some(parent);
        self
    }

    pub fn top_level(mut self) -> Self {
        self.top_level_only = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check whether a log entry matches every set filter
    pub fn matches(&self, log: &ExecutionLog) -> bool {
        if let Some(ref workflow_id) = self.workflow_id {
            if log.workflow_id() != workflow_id {
                return false;
            }
        }

        if let Some(ref step_id) = self.step_id {
            if log.step_id() != step_id {
                return false;
            }
        }

        if let Some(status) = self.status {
            if log.status() != status {
                return false;
            }
        }

        if let Some(ref parent) = self.parent_execution_log_id {
            if log.parent_execution_log_id() != Some(parent) {
                return false;
            }
        }

        if self.top_level_only && log.parent_execution_log_id().is_some() {
            return false;
        }

        true
    }
}
