//! Pipeline engine: sequential phases, concurrent agents within a phase
//!
//! The engine is the single writer of run metadata and checkpoints.
//! A phase completes only when every dispatched agent succeeds; a
//! completed phase is checkpointed so a resumed run skips it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};

use crate::agents::{AgentExecutor, AgentOutcome};
use crate::pipeline::{AgentId, Phase, PipelineRegistry};
use crate::workspace::{RunStatus, Workspace, WorkspaceStore};
use crate::{Error, Result};

pub struct PipelineEngine {
    registry: PipelineRegistry,
    store: WorkspaceStore,
    executors: HashMap<AgentId, Arc<dyn AgentExecutor>>,
}

impl PipelineEngine {
    pub fn new(
        registry: PipelineRegistry,
        store: WorkspaceStore,
        executors: HashMap<AgentId, Arc<dyn AgentExecutor>>,
    ) -> Self {
        Self {
            registry,
            store,
            executors,
        }
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    /// Execute the workspace's pipeline from its current state.
    /// Phases with an existing checkpoint are skipped, which makes a
    /// fresh run and a resume the same code path.
    pub async fn run(&self, workspace: &mut Workspace) -> Result<()> {
        let phases = self
            .registry
            .phases_for(workspace.meta.target_type)?
            .to_vec();
        self.store
            .update_status(workspace, RunStatus::Running, None)?;

        for phase in &phases {
            if self.store.load_checkpoint(workspace, &phase.id)?.is_some() {
                info!(phase = %phase.id, "checkpoint present, skipping phase");
                self.store
                    .update_status(workspace, RunStatus::Running, Some(&phase.id))?;
                continue;
            }

            info!(phase = %phase.id, agents = phase.agents.len(), "running phase");
            let outcomes = self.run_phase(phase, workspace).await?;

            for (agent, outcome) in &outcomes {
                if let AgentOutcome::Failure { kind, detail } = outcome {
                    error!(phase = %phase.id, %agent, %kind, "phase failed");
                    self.store
                        .update_status(workspace, RunStatus::Failed, None)?;
                    return Err(Error::AgentFailed {
                        agent: agent.clone(),
                        detail: format!("{kind}: {detail}"),
                    });
                }
            }

            self.store
                .save_checkpoint(workspace, &phase.id, json!({ "agents": outcomes }))?;
            self.store
                .update_status(workspace, RunStatus::Running, Some(&phase.id))?;
        }

        self.store
            .update_status(workspace, RunStatus::Completed, None)?;
        info!(workspace = %workspace.path.display(), "pipeline completed");
        Ok(())
    }

    /// Dispatch every non-gated agent of the phase concurrently and
    /// collect all outcomes. A failing agent never cancels its
    /// siblings; the phase is judged only after all of them finish.
    async fn run_phase(
        &self,
        phase: &Phase,
        workspace: &Workspace,
    ) -> Result<BTreeMap<String, AgentOutcome>> {
        let mut outcomes = BTreeMap::new();
        let mut handles = Vec::new();

        for spec in &phase.agents {
            if let Some(gate) = spec.gate {
                if !workspace.artifact_has_content(gate) {
                    info!(agent = %spec.id, %gate, "gate artifact absent or empty, skipping");
                    outcomes.insert(
                        spec.id.to_string(),
                        AgentOutcome::Skipped {
                            reason: format!("gate artifact '{gate}' absent or empty"),
                        },
                    );
                    continue;
                }
            }

            let executor = self
                .executors
                .get(&spec.id)
                .ok_or_else(|| {
                    Error::Config(format!("no executor registered for agent '{}'", spec.id))
                })?
                .clone();
            let spec = spec.clone();
            let ws = workspace.clone();
            handles.push((
                spec.id,
                tokio::spawn(async move { executor.execute(&spec, &ws).await }),
            ));
        }

        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => {
                    warn!(agent = %id, %err, "agent returned an error");
                    AgentOutcome::Failure {
                        kind: error_kind(&err).to_string(),
                        detail: err.to_string(),
                    }
                }
                Err(join_err) => AgentOutcome::Failure {
                    kind: "panic".to_string(),
                    detail: join_err.to_string(),
                },
            };
            outcomes.insert(id.to_string(), outcome);
        }
        Ok(outcomes)
    }
}

/// Short failure category recorded in checkpoints and error messages
fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::PollTimeout { .. } => "timeout",
        Error::JobFailed { .. } => "job-failed",
        Error::Tool(_) => "tool",
        Error::Service(_) | Error::Http(_) => "service",
        Error::Io(_) => "io",
        _ => "error",
    }
}
