//! Built-in step handlers

mod action;
mod ai_prompt;
mod condition;
mod define_variable;
mod fetch_api_data;
mod fields;
mod for_each;
mod query_data;
mod record;
mod send_email;
mod transform_content;
mod trigger;

use std::sync::Arc;

pub use action::GenericActionHandler;
pub use ai_prompt::AiPromptHandler;
pub use condition::ConditionHandler;
pub use define_variable::DefineVariableHandler;
pub use fetch_api_data::FetchApiDataHandler;
pub use for_each::ForEachHandler;
pub use query_data::QueryDataHandler;
pub use record::{CreateRecordHandler, UpdateRecordHandler};
pub use send_email::SendEmailHandler;
pub use transform_content::TransformContentHandler;
pub use trigger::TriggerHandler;

use crate::domain::workflow::{HandlerRegistry, StepHandler, StepId, WorkflowError};
use crate::domain::{ApiClient, DomainError, Mailer, RecordStore, TextGenerator};

/// Collaborators the built-in handlers delegate side effects to
#[derive(Clone)]
pub struct HandlerDependencies {
    pub text_generator: Arc<dyn TextGenerator>,
    pub record_store: Arc<dyn RecordStore>,
    pub mailer: Arc<dyn Mailer>,
    pub api_client: Arc<dyn ApiClient>,
}

impl HandlerDependencies {
    pub fn new(
        text_generator: Arc<dyn TextGenerator>,
        record_store: Arc<dyn RecordStore>,
        mailer: Arc<dyn Mailer>,
        api_client: Arc<dyn ApiClient>,
    ) -> Self {
        Self {
            text_generator,
            record_store,
            mailer,
            api_client,
        }
    }
}

/// Build a registry holding every built-in handler
pub fn default_registry(deps: HandlerDependencies) -> HandlerRegistry {
    let query_data: Arc<dyn StepHandler> =
        Arc::new(QueryDataHandler::new(deps.record_store.clone()));

    HandlerRegistry::new()
        .with_handler("TRIGGER", Arc::new(TriggerHandler))
        .with_handler("AI_PROMPT", Arc::new(AiPromptHandler::new(deps.text_generator)))
        .with_handler("CONDITION", Arc::new(ConditionHandler))
        .with_handler("FOR_EACH", Arc::new(ForEachHandler))
        .with_handler("ACTION", Arc::new(GenericActionHandler))
        .with_handler(
            "ACTION_CREATE_RECORD",
            Arc::new(CreateRecordHandler::new(deps.record_store.clone())),
        )
        .with_handler(
            "ACTION_UPDATE_RECORD",
            Arc::new(UpdateRecordHandler::new(deps.record_store.clone())),
        )
        .with_handler("QUERY_DATA", query_data.clone())
        .with_handler("FETCH_RECORDS", query_data)
        .with_handler("FETCH_API_DATA", Arc::new(FetchApiDataHandler::new(deps.api_client)))
        .with_handler("ACTION_SEND_EMAIL", Arc::new(SendEmailHandler::new(deps.mailer)))
        .with_handler("DEFINE_VARIABLE", Arc::new(DefineVariableHandler))
        .with_handler("TRANSFORM_CONTENT", Arc::new(TransformContentHandler))
}

/// Error for a missing or malformed config entry
fn config_error(step: &StepId, message: impl Into<String>) -> WorkflowError {
    WorkflowError::step_execution(step.as_str(), message)
}

/// Error for a failed collaborator call
fn collaborator_error(step: &StepId, err: DomainError) -> WorkflowError {
    WorkflowError::step_execution(step.as_str(), err.to_string())
}
