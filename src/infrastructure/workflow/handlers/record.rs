//! ACTION_CREATE_RECORD and ACTION_UPDATE_RECORD handlers

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::fields::resolve_fields;
use super::{collaborator_error, config_error};
use crate::domain::workflow::{
    templated_value, template::value_to_string, ExecutionContext, NestedStepExecutor, StepHandler,
    StepResult, WorkflowError, WorkflowStep,
};
use crate::domain::RecordStore;

/// Context key a record is mirrored under, e.g. `task` for `Task`
fn context_key(target_model: &str) -> String {
    target_model
        .rsplit(['\\', ':', '.'])
        .next()
        .unwrap_or(target_model)
        .to_lowercase()
}

fn target_model(step: &WorkflowStep) -> Result<String, WorkflowError> {
    step.config_str("target_model")
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .ok_or_else(|| config_error(step.id(), "target_model is required"))
}

/// Creates a record through the record store
pub struct CreateRecordHandler {
    store: Arc<dyn RecordStore>,
}

impl CreateRecordHandler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StepHandler for CreateRecordHandler {
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        _executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        let model = target_model(step)?;
        let fields = resolve_fields(step.config_value("fields"), context);
        if fields.is_empty() {
            return Err(config_error(
                step.id(),
                format!("No fields provided to create a {} record", model),
            ));
        }

        let record = self
            .store
            .create(&model, fields.clone())
            .await
            .map_err(|e| collaborator_error(step.id(), e))?;

        info!(step_id = %step.id(), record = %record, "Record created");

        let mut mirrored = fields;
        mirrored.insert("id".to_string(), Value::String(record.id.clone()));

        Ok(StepResult::new(
            json!({ "entity_type": record.entity_type, "id": record.id }),
            json!({ "id": record.id, "new_record_id": record.id, "model": model }),
        )
        .with_context(json!({ context_key(&model): mirrored })))
    }
}

/// Updates an existing record through the record store
pub struct UpdateRecordHandler {
    store: Arc<dyn RecordStore>,
}

impl UpdateRecordHandler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StepHandler for UpdateRecordHandler {
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        _executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        let model = target_model(step)?;
        let record_id = step
            .config_value("record_id")
            .map(|raw| value_to_string(&templated_value(raw, context)))
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| config_error(step.id(), "record_id is required"))?;

        let fields = resolve_fields(step.config_value("fields"), context);

        self.store
            .update(&model, &record_id, fields.clone())
            .await
            .map_err(|e| collaborator_error(step.id(), e))?;

        info!(step_id = %step.id(), model = %model, record_id = %record_id, "Record updated");

        let mut mirrored = fields;
        mirrored.insert("id".to_string(), Value::String(record_id.clone()));

        Ok(StepResult::completed(json!({ "id": record_id, "model": model }))
            .with_context(json!({ context_key(&model): mirrored })))
    }
}
