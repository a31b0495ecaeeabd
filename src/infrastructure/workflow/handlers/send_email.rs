//! ACTION_SEND_EMAIL handler

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{collaborator_error, config_error};
use crate::domain::workflow::{
    template::value_to_string, templated_value, ExecutionContext, NestedStepExecutor, StepHandler,
    StepResult, WorkflowError, WorkflowStep,
};
use crate::domain::{EmailMessage, Mailer};

/// Renders `to`, `subject` and `body` and hands the message to the mailer
pub struct SendEmailHandler {
    mailer: Arc<dyn Mailer>,
}

impl SendEmailHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    fn render(step: &WorkflowStep, key: &str, context: &ExecutionContext) -> String {
        step.config_value(key)
            .map(|raw| value_to_string(&templated_value(raw, context)))
            .unwrap_or_default()
    }
}

#[async_trait]
impl StepHandler for SendEmailHandler {
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        _executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        let to = Self::render(step, "to", context).trim().to_string();
        if to.is_empty() {
            return Err(config_error(step.id(), "Recipient 'to' is required"));
        }
        let subject = Self::render(step, "subject", context);
        let body = Self::render(step, "body", context);

        let message_ref = self
            .mailer
            .send(EmailMessage::new(to.clone(), subject.clone(), body))
            .await
            .map_err(|e| collaborator_error(step.id(), e))?;

        info!(step_id = %step.id(), to = %to, message_id = %message_ref.as_str(), "Email sent");

        Ok(StepResult::completed(json!({
            "to": to,
            "subject": subject,
            "message_id": message_ref.as_str(),
        })))
    }
}
