//! Agency Workflow
//!
//! A workflow execution engine for agency automation:
//! - Typed steps dispatched to pluggable handlers
//! - A shared JSON context with `{{ path }}` templates and recursive merging
//! - CONDITION branches and FOR_EACH loops over nested steps
//! - One execution log entry per step invocation

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AiConfig;
use domain::TextGenerator;
use infrastructure::{
    ai::{OpenAiTextGenerator, TokenPricing, UnconfiguredTextGenerator},
    execution_log::InMemoryExecutionLogStore,
    http::ReqwestApiClient,
    notification::LogMailer,
    record::InMemoryRecordStore,
    workflow::{default_registry, HandlerDependencies, WorkflowEngine},
};
use tracing::{info, warn};

/// Engine wired to the in-process collaborators
#[derive(Debug, Clone)]
pub struct WorkflowRuntime {
    pub engine: Arc<WorkflowEngine>,
    pub log_store: InMemoryExecutionLogStore,
    pub record_store: InMemoryRecordStore,
    pub mailer: LogMailer,
}

/// Create the runtime with the default configuration
pub fn create_runtime() -> anyhow::Result<WorkflowRuntime> {
    create_runtime_with_config(&AppConfig::default())
}

/// Create the runtime with custom configuration
pub fn create_runtime_with_config(config: &AppConfig) -> anyhow::Result<WorkflowRuntime> {
    let log_store = InMemoryExecutionLogStore::new();
    let record_store = InMemoryRecordStore::new();
    let mailer = LogMailer::new();

    let api_client =
        ReqwestApiClient::with_timeout(Duration::from_secs(config.http.timeout_secs))?;

    let deps = HandlerDependencies::new(
        create_text_generator(&config.ai)?,
        Arc::new(record_store.clone()),
        Arc::new(mailer.clone()),
        Arc::new(api_client),
    );
    let registry = Arc::new(default_registry(deps));

    info!(handlers = registry.len(), "Handler registry ready");

    let engine = WorkflowEngine::with_config(
        registry,
        Arc::new(log_store.clone()),
        config.engine.clone(),
    );

    Ok(WorkflowRuntime {
        engine: Arc::new(engine),
        log_store,
        record_store,
        mailer,
    })
}

fn create_text_generator(config: &AiConfig) -> anyhow::Result<Arc<dyn TextGenerator>> {
    let Some(api_key) = config.api_key() else {
        warn!("No AI API key configured, AI_PROMPT steps will fail");
        return Ok(Arc::new(UnconfiguredTextGenerator));
    };

    let client = ReqwestApiClient::with_timeout(Duration::from_secs(config.timeout_secs))?;
    let generator = OpenAiTextGenerator::new(client, api_key)
        .with_base_url(config.base_url.clone())
        .with_model(config.model.clone())
        .with_pricing(TokenPricing::new(
            config.input_price_per_1k,
            config.output_price_per_1k,
        ))
        .with_prompts(config.prompts.clone());

    info!(
        base_url = %config.base_url,
        model = %config.model,
        "Using OpenAI-compatible text generator"
    );

    Ok(Arc::new(generator))
}
