//! Validate command - checks a workflow file against the built-in handlers

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::domain::workflow::{HandlerRegistry, Workflow};
use crate::infrastructure::workflow::load_workflow;

/// Arguments for the validate command
#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Workflow definition file (.json or .toml)
    #[arg(long)]
    pub workflow: PathBuf,
}

/// Run the command
pub async fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let config = super::bootstrap();
    let runtime = crate::create_runtime_with_config(&config)?;

    let workflow = load_workflow(&args.workflow).await?;
    println!("{}", validate(&workflow, runtime.engine.registry())?);

    Ok(())
}

/// Check every step, nested ones included, and describe the result
pub fn validate(workflow: &Workflow, registry: &HandlerRegistry) -> anyhow::Result<String> {
    registry.validate(workflow)?;

    let steps = count_steps(workflow.steps());
    info!(workflow_id = %workflow.id(), steps, "Workflow is valid");

    Ok(format!(
        "Workflow '{}' is valid ({} steps)",
        workflow.id(),
        steps
    ))
}

fn count_steps(steps: &[crate::domain::workflow::WorkflowStep]) -> usize {
    steps
        .iter()
        .map(|step| 1 + count_steps(step.children()))
        .sum()
}
