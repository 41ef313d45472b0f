use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;
mod commands;

use args::{Args, Command};
use bountyflow_core::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Run {
            target,
            target_type,
            skip_preflight,
        } => commands::run(&config, &target, &target_type, skip_preflight).await,
        Command::Resume { workspace, target } => {
            commands::resume(&config, workspace, target.as_deref()).await
        }
        Command::CheckServices { target_type } => {
            commands::check(&config, target_type.as_deref()).await
        }
        Command::Status { workspace } => commands::status(&config, workspace),
        Command::ListRuns { limit } => commands::list_runs(&config, limit),
    }
}
