//! FETCH_API_DATA handler

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::config_error;
use crate::domain::http::{ApiAuth, ApiClient, ApiRequest, HttpMethod};
use crate::domain::workflow::{
    resolve_template, template::resolve_in_map, template::value_to_string, templated_value,
    ExecutionContext, NestedStepExecutor, StepHandler, StepResult, WorkflowError, WorkflowStep,
};

/// Calls an external API and exposes its response
///
/// Config:
/// - `api_url` (templated, required), `api_method` (default `GET`)
/// - `api_auth_type`: `NONE | BEARER | BASIC | CUSTOM_HEADER` with
///   `api_auth_token`, `api_auth_username`/`api_auth_password` or
///   `api_auth_header_name`/`api_auth_header_value`
/// - `api_headers`: object of extra templated headers
/// - `api_payload`: JSON text rendered as a template, or a templated object;
///   query parameters for GET
/// - `api_response_key`: dotted path picked out of the response body
pub struct FetchApiDataHandler {
    client: Arc<dyn ApiClient>,
}

impl FetchApiDataHandler {
    pub fn new(client: Arc<dyn ApiClient>) -> Self {
        Self { client }
    }

    fn build_request(
        step: &WorkflowStep,
        context: &ExecutionContext,
    ) -> Result<ApiRequest, WorkflowError> {
        let url = text(step, "api_url", context);
        if url.is_empty() {
            return Err(config_error(
                step.id(),
                "API endpoint URL is required for FETCH_API_DATA",
            ));
        }

        let method_name = step
            .config_str("api_method")
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("GET");
        let method = HttpMethod::parse(method_name).ok_or_else(|| {
            config_error(step.id(), format!("Unsupported HTTP method: {}", method_name))
        })?;

        let mut request = ApiRequest::new(method, url).with_auth(auth(step, context)?);

        if let Some(Value::Object(headers)) = step
            .config_value("api_headers")
            .map(|h| templated_value(h, context))
        {
            for (name, value) in headers {
                request = request.with_header(name, value_to_string(&value));
            }
        }

        Ok(match payload(step, context) {
            Some(payload) => request.with_payload(payload),
            None => request,
        })
    }
}

/// Templated config text, trimmed
fn text(step: &WorkflowStep, key: &str, context: &ExecutionContext) -> String {
    step.config_value(key)
        .map(|raw| value_to_string(&templated_value(raw, context)))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

/// Credentials; blank credentials mean no authentication
fn auth(step: &WorkflowStep, context: &ExecutionContext) -> Result<ApiAuth, WorkflowError> {
    let kind = step
        .config_str("api_auth_type")
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "NONE".to_string());

    let auth = match kind.as_str() {
        "NONE" => ApiAuth::None,
        "BEARER" => {
            let token = text(step, "api_auth_token", context);
            if token.is_empty() {
                ApiAuth::None
            } else {
                ApiAuth::Bearer(token)
            }
        }
        "BASIC" => {
            let username = text(step, "api_auth_username", context);
            let password = text(step, "api_auth_password", context);
            if username.is_empty() {
                ApiAuth::None
            } else {
                ApiAuth::Basic {
                    username,
                    password: Some(password).filter(|p| !p.is_empty()),
                }
            }
        }
        "CUSTOM_HEADER" => {
            let name = text(step, "api_auth_header_name", context);
            let value = text(step, "api_auth_header_value", context);
            if name.is_empty() || value.is_empty() {
                ApiAuth::None
            } else {
                ApiAuth::Header { name, value }
            }
        }
        other => {
            return Err(config_error(
                step.id(),
                format!("Unsupported auth type: {}", other),
            ))
        }
    };

    Ok(auth)
}

/// Request payload; invalid JSON text is dropped with a warning
fn payload(step: &WorkflowStep, context: &ExecutionContext) -> Option<Value> {
    match step.config_value("api_payload")? {
        Value::Null => None,
        Value::String(raw) if raw.trim().is_empty() => None,
        Value::String(raw) => {
            let rendered = resolve_template(raw, context);
            match serde_json::from_str::<Value>(&rendered) {
                Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
                _ => {
                    warn!(step_id = %step.id(), "Ignoring api_payload that is not JSON");
                    None
                }
            }
        }
        other => Some(templated_value(other, context)),
    }
}

/// Part of the response body selected by `api_response_key`
fn select(step: &WorkflowStep, body: Value) -> Value {
    let Some(key) = step
        .config_str("api_response_key")
        .map(str::trim)
        .filter(|k| !k.is_empty())
    else {
        return body;
    };

    match body {
        Value::Object(map) => resolve_in_map(key, &map).cloned().unwrap_or(Value::Null),
        other => other,
    }
}

#[async_trait]
impl StepHandler for FetchApiDataHandler {
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        _executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        let request = Self::build_request(step, context)?;
        let method = request.method;
        let url = request.url.clone();

        debug!(step_id = %step.id(), method = %method, url = %url, "Fetching API data");

        let started = Instant::now();
        let response = self.client.send(request).await.map_err(|e| {
            WorkflowError::step_execution(step.id().as_str(), format!("API request failed: {}", e))
        })?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let status = response.status;
        let data = select(step, response.body.clone());

        Ok(StepResult::new(
            json!({
                "api_url": url,
                "api_method": method,
                "response_status": status,
                "body": response.body,
            }),
            json!({
                "status": status,
                "parsed": data,
                "duration_ms": duration_ms,
            }),
        ))
    }
}
