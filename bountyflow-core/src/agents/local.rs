//! Local-process agent execution
//!
//! Wraps the pipeline's CLI tools (indago, burrito, cepheus, vinculum,
//! ariadne). Exit code 0 is success; anything else fails the agent
//! with captured output. Every invocation is bounded by a timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{AgentExecutor, AgentOutcome};
use crate::pipeline::{artifacts, AgentId, AgentSpec};
use crate::workspace::Workspace;
use crate::{Error, Result};

/// Captured result of one tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a single binary with a bounded execution time
#[derive(Debug, Clone)]
pub struct ToolRunner {
    binary: PathBuf,
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run the tool, capturing output; non-zero exit is not an error here
    pub async fn run(&self, args: &[String], cwd: &Path) -> Result<ToolOutput> {
        debug!(binary = %self.binary.display(), ?args, "running tool");

        let result = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary)
                .args(args)
                .current_dir(cwd)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            Error::Tool(format!(
                "{} timed out after {}s",
                self.binary.display(),
                self.timeout.as_secs()
            ))
        })?;

        let output = result.map_err(|e| {
            Error::Tool(format!("failed to start {}: {e}", self.binary.display()))
        })?;

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run the tool and fail on non-zero exit
    pub async fn run_checked(&self, args: &[String], cwd: &Path) -> Result<ToolOutput> {
        let output = self.run(args, cwd).await?;
        if output.exit_code != 0 {
            return Err(Error::Tool(format!(
                "{} exited with code {}\nstdout: {}\nstderr: {}",
                self.binary.display(),
                output.exit_code,
                output.stdout.trim(),
                output.stderr.trim()
            )));
        }
        Ok(output)
    }
}

/// Executor for agents backed by a local CLI tool
pub struct LocalToolExecutor {
    runner: ToolRunner,
}

impl LocalToolExecutor {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl AgentExecutor for LocalToolExecutor {
    async fn execute(&self, spec: &AgentSpec, workspace: &Workspace) -> Result<AgentOutcome> {
        for args in command_plan(spec, workspace)? {
            self.runner.run_checked(&args, &workspace.path).await?;
        }

        let produced = spec
            .outputs
            .iter()
            .filter(|name| workspace.artifact_path(name).exists())
            .map(|name| name.to_string())
            .collect();
        Ok(AgentOutcome::Success { artifacts: produced })
    }
}

fn path_arg(workspace: &Workspace, name: &str) -> String {
    workspace.artifact_path(name).display().to_string()
}

/// Argument vectors for one agent run; correlation needs two passes
fn command_plan(spec: &AgentSpec, workspace: &Workspace) -> Result<Vec<Vec<String>>> {
    let plan = match spec.id {
        AgentId::ApiFuzz => {
            let mut args = vec!["scan".to_string()];
            // Prefer recon-discovered endpoints; without them the
            // target itself is treated as the API spec location
            if workspace
                .artifact_path(artifacts::RETICUSTOS_ENDPOINTS)
                .exists()
            {
                args.push("--targets-from".into());
                args.push(path_arg(workspace, artifacts::RETICUSTOS_ENDPOINTS));
            } else {
                args.push("--spec".into());
                args.push(workspace.meta.target.clone());
            }
            args.extend([
                "-o".into(),
                path_arg(workspace, artifacts::INDAGO_REPORT),
                "-f".into(),
                "json".into(),
                "--export-waf-blocked".into(),
                path_arg(workspace, artifacts::WAF_BLOCKED),
            ]);
            vec![args]
        }
        AgentId::WafBypass => vec![vec![
            "bypass".into(),
            "--from-indago".into(),
            path_arg(workspace, artifacts::WAF_BLOCKED),
            "-t".into(),
            "all".into(),
            "-o".into(),
            path_arg(workspace, artifacts::BURRITO_REPORT),
            "-f".into(),
            "json".into(),
        ]],
        AgentId::ContainerEscape => vec![vec![
            "analyze".into(),
            path_arg(workspace, artifacts::NUBICUSTOS_CONTAINERS),
            "--from-nubicustos".into(),
            path_arg(workspace, artifacts::NUBICUSTOS_CONTAINERS),
            "-o".into(),
            path_arg(workspace, artifacts::CEPHEUS_REPORT),
            "-f".into(),
            "json".into(),
            "-s".into(),
            "low".into(),
        ]],
        AgentId::Correlate => {
            let reports = correlation_inputs(workspace)?;
            if reports.is_empty() {
                return Err(Error::Tool(
                    "no report files in workspace to correlate".to_string(),
                ));
            }
            let ingest = |format: &str, output: &str| {
                let mut args = vec!["ingest".to_string()];
                args.extend(reports.iter().cloned());
                args.extend([
                    "-f".into(),
                    format.to_string(),
                    "-o".into(),
                    path_arg(workspace, output),
                    "--min-severity".into(),
                    "info".into(),
                ]);
                args
            };
            vec![
                ingest("json", artifacts::VINCULUM_CORRELATED),
                ingest("ariadne", artifacts::VINCULUM_ARIADNE),
            ]
        }
        AgentId::AttackPaths => vec![vec![
            "analyze".into(),
            path_arg(workspace, artifacts::VINCULUM_ARIADNE),
            "-o".into(),
            path_arg(workspace, artifacts::ARIADNE_REPORT),
            "-p".into(),
            "-s".into(),
            "--privesc".into(),
            "-f".into(),
            "json".into(),
        ]],
        other => {
            return Err(Error::Tool(format!(
                "agent '{other}' has no local tool invocation"
            )))
        }
    };
    Ok(plan)
}

/// Every *.json report in the workspace, excluding run metadata and
/// the correlator's own outputs, sorted for deterministic argument order
fn correlation_inputs(workspace: &Workspace) -> Result<Vec<String>> {
    let mut reports = Vec::new();
    for entry in std::fs::read_dir(&workspace.path)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == "run-meta.json" || name.starts_with("vinculum-") {
            continue;
        }
        reports.push(path.display().to_string());
    }
    reports.sort();
    Ok(reports)
}
