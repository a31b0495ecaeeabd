//! Text generation collaborator used by AI_PROMPT steps

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(test)]
use mockall::automock;

use crate::domain::error::DomainError;

/// A request for generated text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Identifier of a stored prompt template, used when `prompt` is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template_id: Option<String>,

    /// Prompt already rendered against the execution context
    #[serde(default)]
    pub prompt: String,

    /// Values made available to the model alongside the prompt
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// Model override; the generator default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn from_template(template_id: impl Into<String>) -> Self {
        Self {
            prompt_template_id: Some(template_id.into()),
            ..Default::default()
        }
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Raw model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawGeneration {
    pub model: String,
    pub text: String,
}

/// Result of a generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub raw: RawGeneration,

    /// JSON-decoded text when the model answered with JSON, `{text}` otherwise
    pub parsed: Value,

    pub token_usage: u64,

    pub cost: f64,
}

impl Generation {
    /// Build a generation, decoding the text as JSON when possible
    pub fn from_text(model: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let parsed = parse_generated_text(&text);
        Self {
            raw: RawGeneration {
                model: model.into(),
                text,
            },
            parsed,
            token_usage: 0,
            cost: 0.0,
        }
    }

    pub fn with_token_usage(mut self, token_usage: u64) -> Self {
        self.token_usage = token_usage;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

/// Decode model output, accepting JSON wrapped in a markdown code fence
pub fn parse_generated_text(text: &str) -> Value {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    match serde_json::from_str::<Value>(unfenced) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => serde_json::json!({ "text": text }),
    }
}

/// Backend producing text for AI_PROMPT steps
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for a rendered prompt
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, DomainError>;
}
