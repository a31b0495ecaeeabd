//! Workflow domain module
//!
//! A workflow is an ordered list of typed steps run against a shared,
//! mutable [`ExecutionContext`]. Each step is dispatched to a
//! [`StepHandler`] looked up in the [`HandlerRegistry`]; CONDITION and
//! FOR_EACH handlers recurse into their children through a
//! [`NestedStepExecutor`].
//!
//! ## Templates
//!
//! String configuration values may reference the context with
//! `{{ path.to.value }}`; segments are separated by `.` or `:`.

mod context;
mod entity;
mod error;
mod executor;
mod handler;
mod registry;
mod step_types;
pub mod template;

pub use context::{
    deep_merge, ExecutionContext, CONDITION_KEY, LOOP_KEY, STEPS_KEY, TRIGGER_KEY, VARIABLES_KEY,
};
pub use entity::{
    ordered, validate_workflow_id, OnErrorAction, StepId, StepType, Workflow, WorkflowId,
    WorkflowStep, MAX_ID_LENGTH,
};
pub use error::WorkflowError;
pub use executor::{RunSummary, StepOutcome, StepStatus, StepsRun, WorkflowExecutor};
pub use handler::{NestedStepExecutor, StepHandler, StepResult};
pub use registry::{handler_key, normalize_handler_key, HandlerRegistry, ACTION_TYPE_KEY};
pub use step_types::{is_truthy, values_equal, ConditionOperator, ConditionRule};
pub use template::{resolve_template, resolve_value, strip_placeholder, templated_value};
