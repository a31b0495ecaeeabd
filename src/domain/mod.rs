//! Domain layer - Core business logic and entities

pub mod ai;
pub mod error;
pub mod execution_log;
pub mod http;
pub mod notification;
pub mod record;
pub mod workflow;

pub use ai::{Generation, GenerationRequest, RawGeneration, TextGenerator};
pub use error::DomainError;
pub use execution_log::{
    ExecutionLog, ExecutionLogError, ExecutionLogId, ExecutionLogQuery, ExecutionLogStore,
    ExecutionStatus, LogCompletion,
};
pub use http::{ApiAuth, ApiClient, ApiRequest, ApiResponse, HttpMethod};
pub use notification::{EmailMessage, Mailer, MessageRef};
pub use record::{FilterOperator, RecordFilter, RecordOrder, RecordQuery, RecordRef, RecordStore};
pub use workflow::{
    ExecutionContext, HandlerRegistry, NestedStepExecutor, OnErrorAction, RunSummary, StepHandler,
    StepId, StepOutcome, StepResult, StepStatus, StepType, Workflow, WorkflowError,
    WorkflowExecutor, WorkflowId, WorkflowStep,
};
