//! Workflow domain entity

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::error::WorkflowError;

/// Maximum length for workflow IDs
pub const MAX_ID_LENGTH: usize = 64;

/// Regex pattern for valid workflow IDs: alphanumeric, hyphens and underscores
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*[a-zA-Z0-9]$|^[a-zA-Z0-9]$").unwrap()
});

/// Validated workflow identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Create a new validated workflow ID
    pub fn new(id: impl Into<String>) -> Result<Self, WorkflowError> {
        let id = id.into();
        validate_workflow_id(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WorkflowId {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorkflowId> for String {
    fn from(id: WorkflowId) -> Self {
        id.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for WorkflowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate a workflow ID string
pub fn validate_workflow_id(id: &str) -> Result<(), WorkflowError> {
    if id.is_empty() {
        return Err(WorkflowError::validation("Workflow ID cannot be empty"));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(WorkflowError::validation(format!(
            "Workflow ID exceeds maximum length of {} characters",
            MAX_ID_LENGTH
        )));
    }

    if !ID_PATTERN.is_match(id) {
        return Err(WorkflowError::validation(format!(
            "Invalid workflow ID '{}': must be alphanumeric with hyphens or underscores, start and end with alphanumeric",
            id
        )));
    }

    Ok(())
}

/// Identifier of a step within a workflow
///
/// Authoring tools emit either numeric or string ids; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for StepId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Ok(Self(s)),
            Raw::Int(n) => Ok(Self(n.to_string())),
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<i64> for StepId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// Kind of a workflow step
///
/// Parsing is case-insensitive; anything outside the built-in set is kept as
/// an upper-cased custom kind so that externally registered handlers can
/// serve it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StepType {
    Trigger,
    AiPrompt,
    Condition,
    ForEach,
    Action,
    DefineVariable,
    TransformContent,
    Custom(String),
}

impl StepType {
    pub fn parse(value: &str) -> Self {
        let upper = value.trim().to_uppercase();
        match upper.as_str() {
            "TRIGGER" => Self::Trigger,
            "AI_PROMPT" => Self::AiPrompt,
            "CONDITION" => Self::Condition,
            "FOR_EACH" => Self::ForEach,
            "ACTION" => Self::Action,
            "DEFINE_VARIABLE" => Self::DefineVariable,
            "TRANSFORM_CONTENT" => Self::TransformContent,
            _ => Self::Custom(upper),
        }
    }

    /// Canonical upper-case key of this step type
    pub fn as_str(&self) -> &str {
        match self {
            Self::Trigger => "TRIGGER",
            Self::AiPrompt => "AI_PROMPT",
            Self::Condition => "CONDITION",
            Self::ForEach => "FOR_EACH",
            Self::Action => "ACTION",
            Self::DefineVariable => "DEFINE_VARIABLE",
            Self::TransformContent => "TRANSFORM_CONTENT",
            Self::Custom(key) => key,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for StepType {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl Serialize for StepType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StepType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Action to take when a step fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnErrorAction {
    /// Record the failure and continue with the next sibling step
    #[default]
    Continue,

    /// Stop executing the remaining steps of the list the failure occurred in
    Abort,
}

/// A step within a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    id: StepId,

    #[serde(rename = "type")]
    step_type: StepType,

    /// Type-specific configuration
    #[serde(default)]
    config: Map<String, Value>,

    /// Nested steps, used by CONDITION and FOR_EACH
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<WorkflowStep>,

    /// Rank among siblings
    #[serde(default)]
    order: i64,

    /// Overrides the workflow-level error policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_error: Option<OnErrorAction>,
}

impl WorkflowStep {
    /// Create a new workflow step
    pub fn new(id: impl Into<StepId>, step_type: impl Into<StepType>) -> Self {
        Self {
            id: id.into(),
            step_type: step_type.into(),
            config: Map::new(),
            children: Vec::new(),
            order: 0,
            on_error: None,
        }
    }

    /// Replace the configuration; non-object values yield an empty config
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    pub fn with_children(mut self, children: Vec<WorkflowStep>) -> Self {
        self.children = children;
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn with_on_error(mut self, action: OnErrorAction) -> Self {
        self.on_error = Some(action);
        self
    }

    pub fn id(&self) -> &StepId {
        &self.id
    }

    pub fn step_type(&self) -> &StepType {
        &self.step_type
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Get a single config entry
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// Get a config entry as a string slice
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    pub fn children(&self) -> &[WorkflowStep] {
        &self.children
    }

    /// Children in execution order
    pub fn ordered_children(&self) -> Vec<WorkflowStep> {
        ordered(&self.children)
    }

    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn on_error(&self) -> Option<OnErrorAction> {
        self.on_error
    }
}

/// Sort steps by rank, keeping declaration order for equal ranks
pub fn ordered(steps: &[WorkflowStep]) -> Vec<WorkflowStep> {
    let mut sorted = steps.to_vec();
    sorted.sort_by_key(WorkflowStep::order);
    sorted
}

fn default_enabled() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

/// A workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier
    id: WorkflowId,

    /// Human-readable name
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    /// Top-level steps
    #[serde(default)]
    steps: Vec<WorkflowStep>,

    /// Error policy for steps that do not override it; the engine default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_error: Option<OnErrorAction>,

    #[serde(default = "default_enabled")]
    enabled: bool,

    #[serde(default = "default_version")]
    version: u32,

    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a new workflow
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: None,
            steps: Vec::new(),
            on_error: None,
            enabled: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_steps(mut self, steps: Vec<WorkflowStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_on_error(mut self, action: OnErrorAction) -> Self {
        self.on_error = Some(action);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    /// Snapshot of the top-level steps in execution order
    pub fn ordered_steps(&self) -> Vec<WorkflowStep> {
        ordered(&self.steps)
    }

    pub fn on_error(&self) -> Option<OnErrorAction> {
        self.on_error
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replace the steps, bumping the version
    pub fn set_steps(&mut self, steps: Vec<WorkflowStep>) {
        self.steps = steps;
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Find a step anywhere in the tree
    pub fn find_step(&self, id: &StepId) -> Option<&WorkflowStep> {
        fn walk<'a>(steps: &'a [WorkflowStep], id: &StepId) -> Option<&'a WorkflowStep> {
            steps.iter().find_map(|step| {
                if step.id() == id {
                    Some(step)
                } else {
                    walk(step.children(), id)
                }
            })
        }

        walk(&self.steps, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_workflow_ids() {
        assert!(WorkflowId::new("onboarding").is_ok());
        assert!(WorkflowId::new("client_intake-2").is_ok());
        assert!(WorkflowId::new("a").is_ok());
        assert!(WorkflowId::new("a".repeat(64)).is_ok());
    }

    #[test]
    fn test_invalid_workflow_ids() {
        assert!(WorkflowId::new("").is_err());
        assert!(WorkflowId::new("-start").is_err());
        assert!(WorkflowId::new("end_").is_err());
        assert!(WorkflowId::new("has space").is_err());
        assert!(WorkflowId::new("a".repeat(65)).is_err());
    }

    #[test]
    fn test_step_id_accepts_numbers_and_strings() {
        let numeric: StepId = serde_json::from_value(json!(7)).unwrap();
        let text: StepId = serde_json::from_value(json!("send-mail")).unwrap();

        assert_eq!(numeric.as_str(), "7");
        assert_eq!(text.as_str(), "send-mail");
        assert_eq!(serde_json::to_value(&numeric).unwrap(), json!("7"));
    }

    #[test]
    fn test_step_type_parsing_is_case_insensitive() {
        assert_eq!(StepType::parse("for_each"), StepType::ForEach);
        assert_eq!(StepType::parse(" Ai_Prompt "), StepType::AiPrompt);
        assert_eq!(
            StepType::parse("webhook"),
            StepType::Custom("WEBHOOK".to_string())
        );
        assert_eq!(StepType::parse("webhook").as_str(), "WEBHOOK");
    }

    #[test]
    fn test_step_deserialization() {
        let step: WorkflowStep = serde_json::from_value(json!({
            "id": 3,
            "type": "condition",
            "config": {"field": "lead.qualified"},
            "order": 2,
            "on_error": "abort",
            "children": [
                {"id": 4, "type": "ACTION", "config": {"action_type": "send_email", "when": true}}
            ]
        }))
        .unwrap();

        assert_eq!(step.id().as_str(), "3");
        assert_eq!(step.step_type(), &StepType::Condition);
        assert_eq!(step.config_str("field"), Some("lead.qualified"));
        assert_eq!(step.order(), 2);
        assert_eq!(step.on_error(), Some(OnErrorAction::Abort));
        assert_eq!(step.children().len(), 1);
        assert_eq!(step.children()[0].order(), 0);
    }

    #[test]
    fn test_ordered_steps_are_stable() {
        let workflow = Workflow::new(WorkflowId::new("wf").unwrap(), "Workflow").with_steps(vec![
            WorkflowStep::new("c", "TRIGGER").with_order(2),
            WorkflowStep::new("a", "TRIGGER").with_order(1),
            WorkflowStep::new("b", "TRIGGER").with_order(1),
        ]);

        let ids: Vec<_> = workflow
            .ordered_steps()
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        // The stored definition is left untouched
        assert_eq!(workflow.steps()[0].id().as_str(), "c");
    }

    #[test]
    fn test_workflow_defaults() {
        let workflow: Workflow = serde_json::from_value(json!({
            "id": "lead-intake",
            "name": "Lead intake",
            "steps": []
        }))
        .unwrap();

        assert!(workflow.is_enabled());
        assert_eq!(workflow.version(), 1);
        assert_eq!(workflow.on_error(), None);
    }

    #[test]
    fn test_find_nested_step() {
        let workflow = Workflow::new(WorkflowId::new("wf").unwrap(), "Workflow").with_step(
            WorkflowStep::new("loop", "FOR_EACH")
                .with_children(vec![WorkflowStep::new("inner", "ACTION")]),
        );

        assert!(workflow.find_step(&StepId::from("inner")).is_some());
        assert!(workflow.find_step(&StepId::from("missing")).is_none());
    }

    #[test]
    fn test_set_steps_bumps_version() {
        let mut workflow = Workflow::new(WorkflowId::new("wf").unwrap(), "Workflow");
        workflow.set_steps(vec![WorkflowStep::new(1_i64, "TRIGGER")]);

        assert_eq!(workflow.version(), 2);
        assert_eq!(workflow.steps().len(), 1);
    }
}
