//! Step handler registry

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::entity::{StepType, Workflow, WorkflowStep};
use super::error::WorkflowError;
use super::handler::StepHandler;

/// Config key naming the concrete action of an `ACTION` step
pub const ACTION_TYPE_KEY: &str = "action_type";

/// Compute the registry key for a step type and optional action type
///
/// Step types are upper-cased. `ACTION` with a non-empty action type becomes
/// `ACTION_<ACTION_TYPE>`; without one it stays `ACTION`, the generic no-op.
pub fn normalize_handler_key(step_type: &str, action_type: Option<&str>) -> String {
    let step_type = step_type.trim().to_uppercase();
    if step_type != StepType::Action.as_str() {
        return step_type;
    }

    match action_type.map(str::trim).filter(|a| !a.is_empty()) {
        Some(action) => format!("ACTION_{}", action.to_uppercase()),
        None => step_type,
    }
}

/// Registry key for a concrete step
pub fn handler_key(step: &WorkflowStep) -> String {
    normalize_handler_key(step.step_type().as_str(), step.config_str(ACTION_TYPE_KEY))
}

/// Maps normalized step type keys to handlers
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any handler previously under the key
    pub fn register(&mut self, key: impl AsRef<str>, handler: Arc<dyn StepHandler>) {
        let key = key.as_ref().trim().to_uppercase();
        self.handlers.insert(key, handler);
    }

    /// Builder form of [`HandlerRegistry::register`]
    pub fn with_handler(mut self, key: impl AsRef<str>, handler: Arc<dyn StepHandler>) -> Self {
        self.register(key, handler);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(&key.trim().to_uppercase())
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Resolve the handler for a step
    pub fn resolve(&self, step: &WorkflowStep) -> Result<Arc<dyn StepHandler>, WorkflowError> {
        let key = handler_key(step);
        self.handlers
            .get(&key)
            .cloned()
            .ok_or_else(|| WorkflowError::handler_not_found(key))
    }

    /// Check that every step of a workflow, nested ones included, resolves
    pub fn validate(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        self.validate_steps(workflow.steps())
    }

    /// Check that every step in the tree resolves
    pub fn validate_steps(&self, steps: &[WorkflowStep]) -> Result<(), WorkflowError> {
        let mut unknown = Vec::new();
        self.collect_unknown(steps, &mut unknown);

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::UnknownStepTypes(unknown))
        }
    }

    fn collect_unknown(&self, steps: &[WorkflowStep], unknown: &mut Vec<String>) {
        for step in steps {
            let key = handler_key(step);
            if !self.handlers.contains_key(&key) && !unknown.contains(&key) {
                unknown.push(key);
            }
            self.collect_unknown(step.children(), unknown);
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.keys())
            .finish()
    }
}
