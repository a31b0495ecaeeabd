use agency_workflow::cli::{self, Cli, Command};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => cli::run::run(args).await,
        Command::Validate(args) => cli::validate::run(args).await,
    }
}
