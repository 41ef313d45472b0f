//! Integration tests for run interruption and resume

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use bountyflow_core::agents::{AgentExecutor, AgentOutcome};
use bountyflow_core::engine::PipelineEngine;
use bountyflow_core::pipeline::{AgentId, AgentSpec, PipelineRegistry, TargetType};
use bountyflow_core::workspace::{RunStatus, Workspace, WorkspaceStore};
use bountyflow_core::{Error, Result};

/// Succeeds for every agent except the configured one, recording
/// which agents were dispatched
struct StubExecutor {
    fail_on: Option<AgentId>,
    dispatched: Mutex<Vec<AgentId>>,
}

impl StubExecutor {
    fn new(fail_on: Option<AgentId>) -> Self {
        Self {
            fail_on,
            dispatched: Mutex::new(Vec::new()),
        }
    }

    fn dispatched(&self) -> Vec<AgentId> {
        self.dispatched.lock().expect("lock").clone()
    }
}

#[async_trait]
impl AgentExecutor for StubExecutor {
    async fn execute(&self, spec: &AgentSpec, workspace: &Workspace) -> Result<AgentOutcome> {
        self.dispatched.lock().expect("lock").push(spec.id);
        if self.fail_on == Some(spec.id) {
            return Err(Error::Tool(format!("{} failed", spec.id)));
        }
        for output in spec.outputs {
            std::fs::write(workspace.artifact_path(output), r#"[{"finding": 1}]"#)?;
        }
        Ok(AgentOutcome::Success {
            artifacts: spec.outputs.iter().map(|o| o.to_string()).collect(),
        })
    }
}

fn engine_for(root: &std::path::Path, stub: Arc<StubExecutor>) -> PipelineEngine {
    let registry = PipelineRegistry::new();
    let mut executors: HashMap<AgentId, Arc<dyn AgentExecutor>> = HashMap::new();
    for target_type in TargetType::ALL {
        for phase in registry.phases_for(target_type).expect("should resolve") {
            for spec in &phase.agents {
                executors.insert(spec.id, stub.clone());
            }
        }
    }
    PipelineEngine::new(registry, WorkspaceStore::new(root), executors)
}

#[tokio::test]
async fn test_failed_run_resumes_where_it_stopped() {
    let temp = TempDir::new().expect("should create temp dir");

    // First attempt dies in the api-fuzz phase
    let stub = Arc::new(StubExecutor::new(Some(AgentId::ApiFuzz)));
    let engine = engine_for(temp.path(), stub.clone());
    let mut workspace = engine
        .store()
        .create("https://example.com", TargetType::Web)
        .expect("should create workspace");

    let err = engine.run(&mut workspace).await.expect_err("should fail");
    assert!(matches!(err, Error::AgentFailed { .. }));
    assert_eq!(workspace.meta.status, RunStatus::Failed);
    assert_eq!(stub.dispatched(), vec![AgentId::Recon, AgentId::ApiFuzz]);

    // Second attempt loads the same workspace and picks up after recon
    let stub = Arc::new(StubExecutor::new(None));
    let engine = engine_for(temp.path(), stub.clone());
    let mut resumed = WorkspaceStore::load(&workspace.path).expect("should load");
    assert_eq!(resumed.meta.status, RunStatus::Failed);

    engine.run(&mut resumed).await.expect("resume should succeed");

    assert_eq!(resumed.meta.status, RunStatus::Completed);
    // recon is checkpointed from the first attempt and never re-runs
    assert!(!stub.dispatched().contains(&AgentId::Recon));
    assert_eq!(
        stub.dispatched(),
        vec![
            AgentId::ApiFuzz,
            AgentId::WafBypass,
            AgentId::Correlate,
            AgentId::AttackPaths
        ]
    );
    assert_eq!(
        resumed.meta.phases_completed,
        vec!["recon", "api-fuzz", "waf-bypass", "correlate", "attack-paths"]
    );
}

#[tokio::test]
async fn test_completed_run_is_a_noop_on_rerun() {
    let temp = TempDir::new().expect("should create temp dir");

    let stub = Arc::new(StubExecutor::new(None));
    let engine = engine_for(temp.path(), stub.clone());
    let mut workspace = engine
        .store()
        .create("com.example.app", TargetType::Mobile)
        .expect("should create workspace");

    engine.run(&mut workspace).await.expect("should complete");
    let first_dispatch = stub.dispatched().len();
    assert_eq!(first_dispatch, 3);

    // Every phase is checkpointed, so nothing dispatches again
    engine.run(&mut workspace).await.expect("should complete");
    assert_eq!(stub.dispatched().len(), first_dispatch);
    assert_eq!(workspace.meta.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_find_latest_after_runs() {
    let temp = TempDir::new().expect("should create temp dir");
    let stub = Arc::new(StubExecutor::new(None));
    let engine = engine_for(temp.path(), stub);

    let mut workspace = engine
        .store()
        .create("example.com", TargetType::Api)
        .expect("should create workspace");
    engine.run(&mut workspace).await.expect("should complete");

    let latest = engine
        .store()
        .find_latest(Some("example.com"))
        .expect("should search")
        .expect("should find the run");
    assert_eq!(latest.meta.target, "example.com");
    assert_eq!(latest.meta.status, RunStatus::Completed);
}
