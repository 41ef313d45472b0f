//! Agent executors: the units of work dispatched by the engine

pub mod local;
pub mod remote;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::pipeline::{AgentId, AgentSpec};
use crate::workspace::Workspace;
use crate::Result;

pub use local::{LocalToolExecutor, ToolOutput, ToolRunner};
pub use remote::{RemoteScanExecutor, ServiceClient};

/// Terminal outcome of one agent execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum AgentOutcome {
    /// Agent finished and wrote its artifacts
    Success { artifacts: Vec<String> },
    /// Agent was not dispatched; the reason is recorded
    Skipped { reason: String },
    /// Agent reached a terminal failure
    Failure { kind: String, detail: String },
}

impl AgentOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, AgentOutcome::Failure { .. })
    }
}

/// Executes one agent within a workspace. Whether that means driving
/// a local binary or polling a remote scan is the implementation's
/// concern; the engine only sees the outcome.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, spec: &AgentSpec, workspace: &Workspace) -> Result<AgentOutcome>;
}

/// Per-tool run timeouts, matching each tool's expected runtime
fn tool_timeout(agent: AgentId) -> Duration {
    let secs = match agent {
        AgentId::ApiFuzz | AgentId::WafBypass => 600,
        AgentId::ContainerEscape | AgentId::AttackPaths => 300,
        AgentId::Correlate => 120,
        _ => 600,
    };
    Duration::from_secs(secs)
}

/// Build the executor set for the built-in agent catalogue
pub fn build_executors(config: &Config) -> Result<HashMap<AgentId, Arc<dyn AgentExecutor>>> {
    let mut executors: HashMap<AgentId, Arc<dyn AgentExecutor>> = HashMap::new();

    for (agent, service) in [
        (AgentId::Recon, "reticustos"),
        (AgentId::MobileScan, "mobilicustos"),
        (AgentId::CloudAudit, "nubicustos"),
    ] {
        let client = ServiceClient::new(service, config.service(service)?)?;
        executors.insert(
            agent,
            Arc::new(RemoteScanExecutor::new(
                client,
                config.defaults.clone(),
                config.polling.query_retries,
            )),
        );
    }

    for (agent, tool) in [
        (AgentId::ApiFuzz, "indago"),
        (AgentId::WafBypass, "burrito"),
        (AgentId::ContainerEscape, "cepheus"),
        (AgentId::Correlate, "vinculum"),
        (AgentId::AttackPaths, "ariadne"),
    ] {
        let runner = ToolRunner::new(config.tool_path(tool), tool_timeout(agent));
        executors.insert(agent, Arc::new(LocalToolExecutor::new(runner)));
    }

    Ok(executors)
}
