//! Subcommand implementations

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use bountyflow_core::agents::build_executors;
use bountyflow_core::config::Config;
use bountyflow_core::engine::PipelineEngine;
use bountyflow_core::health::{check_cli_tools, check_services};
use bountyflow_core::pipeline::{PipelineRegistry, TargetType};
use bountyflow_core::report::{format_run_list, format_run_summary, format_status_report};
use bountyflow_core::workspace::WorkspaceStore;

const CLI_TOOLS: [&str; 5] = ["indago", "burrito", "cepheus", "vinculum", "ariadne"];

pub async fn run(
    config: &Config,
    target: &str,
    target_type: &str,
    skip_preflight: bool,
) -> Result<()> {
    let target_type = TargetType::parse(target_type)?;
    let registry = PipelineRegistry::new();
    println!("{}", registry.describe(target_type)?);

    if !skip_preflight {
        preflight(config, &registry, target_type).await?;
    }

    let store = WorkspaceStore::new(&config.workspace.root);
    let mut workspace = store.create(target, target_type)?;
    println!("Workspace: {}", workspace.path.display());

    let engine = PipelineEngine::new(registry, store, build_executors(config)?);
    engine.run(&mut workspace).await?;

    print!("{}", format_run_summary(&workspace)?);
    Ok(())
}

pub async fn resume(
    config: &Config,
    workspace_path: Option<PathBuf>,
    target: Option<&str>,
) -> Result<()> {
    let store = WorkspaceStore::new(&config.workspace.root);
    let mut workspace = match workspace_path {
        Some(path) => WorkspaceStore::load(path)?,
        None => store
            .find_latest(target)?
            .context("no previous run found to resume")?,
    };
    info!(workspace = %workspace.path.display(), "resuming run");
    println!("Resuming: {}", workspace.path.display());

    let engine = PipelineEngine::new(PipelineRegistry::new(), store, build_executors(config)?);
    engine.run(&mut workspace).await?;

    print!("{}", format_run_summary(&workspace)?);
    Ok(())
}

pub async fn check(config: &Config, target_type: Option<&str>) -> Result<()> {
    let services = match target_type {
        Some(t) => PipelineRegistry::new().required_services(TargetType::parse(t)?)?,
        None => config.services.keys().cloned().collect(),
    };
    let health = check_services(config, &services).await;
    let tools = check_cli_tools(config, &CLI_TOOLS);
    print!("{}", format_status_report(&health, &tools));

    if health.iter().any(|s| !s.ok()) {
        bail!("one or more services are unavailable");
    }
    if tools.iter().any(|t| !t.ok()) {
        bail!("one or more CLI tools are missing or not executable");
    }
    Ok(())
}

pub fn status(config: &Config, workspace_path: Option<PathBuf>) -> Result<()> {
    let workspace = match workspace_path {
        Some(path) => WorkspaceStore::load(path)?,
        None => WorkspaceStore::new(&config.workspace.root)
            .find_latest(None)?
            .context("no runs found")?,
    };
    print!("{}", format_run_summary(&workspace)?);
    Ok(())
}

pub fn list_runs(config: &Config, limit: usize) -> Result<()> {
    let runs = WorkspaceStore::new(&config.workspace.root).list(limit)?;
    print!("{}", format_run_list(&runs));
    Ok(())
}

/// Fail fast when a dependency of the selected pipeline is down
async fn preflight(
    config: &Config,
    registry: &PipelineRegistry,
    target_type: TargetType,
) -> Result<()> {
    let services = registry.required_services(target_type)?;
    let health = check_services(config, &services).await;
    let tools = check_cli_tools(config, &CLI_TOOLS);
    print!("{}", format_status_report(&health, &tools));

    if health.iter().any(|s| !s.ok()) {
        bail!("required services are not available; start them or pass --skip-preflight");
    }
    if tools.iter().any(|t| !t.ok()) {
        bail!("required CLI tools are missing or not executable");
    }
    Ok(())
}
