//! Workflow definition files
//!
//! Definitions are JSON or TOML, picked by file extension. Anything other
//! than `.toml` is read as JSON.

use std::path::Path;

use tracing::debug;

use crate::domain::workflow::Workflow;
use crate::domain::DomainError;

/// Supported definition formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Json,
    Toml,
}

impl DefinitionFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Parse a workflow definition from text
pub fn parse_workflow(content: &str, format: DefinitionFormat) -> Result<Workflow, DomainError> {
    match format {
        DefinitionFormat::Json => serde_json::from_str(content)
            .map_err(|e| DomainError::validation(format!("Invalid workflow JSON: {}", e))),
        DefinitionFormat::Toml => toml::from_str(content)
            .map_err(|e| DomainError::validation(format!("Invalid workflow TOML: {}", e))),
    }
}

/// Read and parse a workflow definition file
pub async fn load_workflow(path: impl AsRef<Path>) -> Result<Workflow, DomainError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        DomainError::storage(format!("Failed to read workflow '{}': {}", path.display(), e))
    })?;

    let workflow = parse_workflow(&content, DefinitionFormat::from_path(path))?;
    debug!(
        workflow_id = %workflow.id(),
        steps = workflow.steps().len(),
        path = %path.display(),
        "Loaded workflow definition"
    );

    Ok(workflow)
}
