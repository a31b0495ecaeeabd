//! AI_PROMPT handler

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::{collaborator_error, config_error};
use crate::domain::workflow::{
    resolve_template, template::resolve_in_map, templated_value, ExecutionContext,
    NestedStepExecutor, StepHandler, StepResult, WorkflowError, WorkflowStep, LOOP_KEY,
    TRIGGER_KEY,
};
use crate::domain::{GenerationRequest, TextGenerator};

/// Renders a prompt against the context and asks the text generator for output
///
/// Config:
/// - `prompt`: inline template, or `prompt_template_id` naming a stored one
/// - `variables`: object of templated values sent with the prompt
/// - `aiInputs`: `["trigger:lead.name", "loop:title"]`, each adding the value
///   under its last path segment
/// - `model`: optional model override
pub struct AiPromptHandler {
    generator: Arc<dyn TextGenerator>,
}

impl AiPromptHandler {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    fn build_request(
        step: &WorkflowStep,
        context: &ExecutionContext,
    ) -> Result<GenerationRequest, WorkflowError> {
        let inline = step
            .config_str("prompt")
            .filter(|p| !p.trim().is_empty());
        let template_id = step
            .config_str("prompt_template_id")
            .or_else(|| {
                step.config_value("promptRef")
                    .and_then(|r| r.get("id"))
                    .and_then(Value::as_str)
            })
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let request = match (inline, template_id) {
            (Some(prompt), _) => GenerationRequest::new(resolve_template(prompt, context)),
            (None, Some(id)) => GenerationRequest::from_template(id),
            (None, None) => {
                return Err(config_error(
                    step.id(),
                    "AI_PROMPT requires a prompt or prompt_template_id",
                ))
            }
        };

        let mut variables = match step
            .config_value("variables")
            .map(|v| templated_value(v, context))
        {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        variables.extend(gather_inputs(step, context));

        let request = request.with_variables(variables);
        Ok(match step.config_str("model").filter(|m| !m.trim().is_empty()) {
            Some(model) => request.with_model(model.trim()),
            None => request,
        })
    }
}

/// Resolve `aiInputs` entries against the loop item or the trigger payload
fn gather_inputs(step: &WorkflowStep, context: &ExecutionContext) -> Map<String, Value> {
    let mut inputs = Map::new();
    let Some(Value::Array(entries)) = step.config_value("aiInputs") else {
        return inputs;
    };

    let loop_item = context
        .get(LOOP_KEY)
        .and_then(|l| l.get("item"))
        .and_then(Value::as_object);
    let trigger = context.get(TRIGGER_KEY).and_then(Value::as_object);

    for entry in entries.iter().filter_map(Value::as_str) {
        let (source, path) = entry.split_once(':').unwrap_or(("trigger", entry));
        let path = path.trim();
        let Some(key) = path.rsplit('.').next().filter(|k| !k.is_empty()) else {
            continue;
        };

        let root = match source.trim() {
            "loop" => loop_item.or(trigger),
            _ => trigger,
        };
        let value = root
            .and_then(|map| resolve_in_map(path, map))
            .cloned()
            .unwrap_or(Value::Null);
        inputs.insert(key.to_string(), value);
    }

    inputs
}

#[async_trait]
impl StepHandler for AiPromptHandler {
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        _executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        let request = Self::build_request(step, context)?;

        debug!(
            step_id = %step.id(),
            template = ?request.prompt_template_id,
            variables = request.variables.len(),
            "Requesting generation"
        );

        let generation = self
            .generator
            .generate(request)
            .await
            .map_err(|e| collaborator_error(step.id(), e))?;

        let raw = serde_json::to_value(&generation.raw).map_err(|e| {
            WorkflowError::step_execution(step.id().as_str(), format!("Invalid model output: {}", e))
        })?;

        Ok(StepResult::new(raw, generation.parsed)
            .with_token_usage(generation.token_usage)
            .with_cost(generation.cost))
    }
}
