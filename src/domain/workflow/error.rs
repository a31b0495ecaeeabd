//! Workflow error types

use thiserror::Error;

/// Errors that can occur while loading or executing workflows
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("No handler registered for step type '{key}'")]
    HandlerNotFound { key: String },

    #[error("Step execution failed in '{step}': {message}")]
    StepExecution { step: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Workflow is disabled: {0}")]
    Disabled(String),

    #[error("Maximum nesting depth of {depth} exceeded")]
    NestingTooDeep { depth: usize },

    #[error("Unknown step types: {}", .0.join(", "))]
    UnknownStepTypes(Vec<String>),
}

impl WorkflowError {
    pub fn handler_not_found(key: impl Into<String>) -> Self {
        Self::HandlerNotFound { key: key.into() }
    }

    pub fn step_execution(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepExecution {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn disabled(id: impl Into<String>) -> Self {
        Self::Disabled(id.into())
    }

    pub fn nesting_too_deep(depth: usize) -> Self {
        Self::NestingTooDeep { depth }
    }

    /// Whether the error means no handler could be resolved for a step
    pub fn is_handler_not_found(&self) -> bool {
        matches!(self, Self::HandlerNotFound { .. })
    }
}
