//! CLI module for Agency Workflow
//!
//! Provides subcommands:
//! - `run`: execute a workflow definition and print the run summary
//! - `validate`: check every step type against the built-in handlers

pub mod run;
pub mod validate;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// Agency Workflow - run typed automation workflows from the command line
#[derive(Parser)]
#[command(name = "agency-workflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute a workflow definition
    Run(run::RunArgs),

    /// Validate a workflow definition without running it
    Validate(validate::ValidateArgs),
}

/// Load `.env`, the layered configuration and the log subscriber
fn bootstrap() -> AppConfig {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);

    config
}
