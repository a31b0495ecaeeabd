//! Run command - executes a workflow file against an optional JSON context

use std::path::{Path, PathBuf};

use clap::Args;
use serde_json::{json, Value};
use tracing::info;

use crate::domain::workflow::{ExecutionContext, StepId, WorkflowExecutor};
use crate::domain::{ExecutionLogQuery, ExecutionLogStore};
use crate::infrastructure::workflow::load_workflow;
use crate::WorkflowRuntime;

/// Arguments for the run command
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Workflow definition file (.json or .toml)
    #[arg(long)]
    pub workflow: PathBuf,

    /// JSON file holding the initial context (the trigger payload)
    #[arg(long)]
    pub context: Option<PathBuf>,

    /// Resume the run at this top-level step
    #[arg(long)]
    pub start_at: Option<String>,

    /// Include the execution logs in the output
    #[arg(long)]
    pub logs: bool,
}

/// Run the command and print the report to stdout
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = super::bootstrap();
    let runtime = crate::create_runtime_with_config(&config)?;

    let report = execute(&args, &runtime).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed = report["summary"]["steps"]
        .as_array()
        .map(|steps| steps.iter().filter(|s| s["status"] == "failed").count())
        .unwrap_or(0);
    if failed > 0 {
        anyhow::bail!("{} step(s) failed", failed);
    }

    Ok(())
}

/// Execute the workflow and build the JSON report
pub async fn execute(args: &RunArgs, runtime: &WorkflowRuntime) -> anyhow::Result<Value> {
    let workflow = load_workflow(&args.workflow).await?;
    let context = match &args.context {
        Some(path) => load_context(path).await?,
        None => ExecutionContext::new(),
    };

    info!(workflow_id = %workflow.id(), "Running workflow from {}", args.workflow.display());

    let summary = match &args.start_at {
        Some(step) => {
            runtime
                .engine
                .execute_from(&workflow, context, &StepId::new(step.as_str()))
                .await?
        }
        None => runtime.engine.execute(&workflow, context).await?,
    };

    let mut report = json!({ "summary": summary });
    if args.logs {
        let logs = runtime
            .log_store
            .list(&ExecutionLogQuery::new().with_workflow_id(workflow.id().clone()))
            .await?;
        report["logs"] = serde_json::to_value(logs)?;
    }

    Ok(report)
}

async fn load_context(path: &Path) -> anyhow::Result<ExecutionContext> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read context '{}': {}", path.display(), e))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid context JSON in '{}': {}", path.display(), e))?;

    Ok(ExecutionContext::from_value(value))
}
