//! TRANSFORM_CONTENT handler

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde_json::json;

use super::config_error;
use crate::domain::workflow::{
    template::value_to_string, templated_value, ExecutionContext, NestedStepExecutor, StepHandler,
    StepResult, WorkflowError, WorkflowStep,
};

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r\n|\n|\r").unwrap());
static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Supported transformations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transform {
    FindAndReplace,
    RemoveAfterMarker,
    RemoveHtml,
}

impl Transform {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "find_and_replace" => Some(Self::FindAndReplace),
            "remove_after_marker" => Some(Self::RemoveAfterMarker),
            "remove_html" => Some(Self::RemoveHtml),
            _ => None,
        }
    }
}

/// Applies a text transformation to a templated `source`
///
/// The result is exposed as both `result` and `cleaned_body`, and mirrored
/// under `transform.step_<id>` in the context.
pub struct TransformContentHandler;

impl TransformContentHandler {
    fn text(step: &WorkflowStep, key: &str, context: &ExecutionContext) -> String {
        step.config_value(key)
            .map(|raw| value_to_string(&templated_value(raw, context)))
            .unwrap_or_default()
    }
}

/// Lowercase ASCII letters, digits and single spaces only
fn normalize_for_comparison(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_ALPHANUMERIC.replace_all(&lowered, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Keep every line up to and including the first one containing `marker`
///
/// Lines are compared after normalisation, so punctuation, case and spacing
/// differences do not matter. The source is returned unchanged when the
/// marker is blank or never found.
pub fn remove_after_marker(source: &str, marker: &str) -> String {
    let needle = normalize_for_comparison(marker);
    if needle.is_empty() {
        return source.to_string();
    }

    let mut kept = Vec::new();
    for line in LINE_BREAK.split(source) {
        kept.push(line);
        if normalize_for_comparison(line).contains(&needle) {
            return kept.join("\n").trim().to_string();
        }
    }

    source.to_string()
}

/// Plain text of an HTML fragment with entities decoded
pub fn remove_html(source: &str) -> String {
    Html::parse_fragment(source)
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

#[async_trait]
impl StepHandler for TransformContentHandler {
    async fn handle(
        &self,
        context: &mut ExecutionContext,
        step: &WorkflowStep,
        _executor: &dyn NestedStepExecutor,
    ) -> Result<StepResult, WorkflowError> {
        let kind = step
            .config_str("type")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| config_error(step.id(), "Transformation type is required"))?;
        let transform = Transform::parse(kind).ok_or_else(|| {
            config_error(step.id(), format!("Unknown transformation type: {}", kind))
        })?;

        let source = Self::text(step, "source", context);

        let result = match transform {
            Transform::FindAndReplace => {
                let find = Self::text(step, "find", context);
                if find.is_empty() {
                    source
                } else {
                    source.replace(&find, &Self::text(step, "replace", context))
                }
            }
            Transform::RemoveAfterMarker => {
                remove_after_marker(&source, &Self::text(step, "marker", context))
            }
            Transform::RemoveHtml => remove_html(&source),
        };

        Ok(StepResult::completed(json!({
            "type": kind,
            "result": result,
            "cleaned_body": result,
        }))
        .with_context(json!({
            "transform": {
                format!("step_{}", step.id()): { "result": result, "cleaned_body": result }
            }
        })))
    }
}
