//! Remote-service agent execution
//!
//! The recon, mobile, and cloud agents front REST scan services
//! (reticustos, mobilicustos, nubicustos). Each follows the same
//! lifecycle: create a scan, start it, poll until terminal, then
//! download the findings and service-specific exports into the
//! workspace.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{AgentExecutor, AgentOutcome};
use crate::config::{ScanDefaults, ServiceConfig};
use crate::pipeline::{artifacts, AgentId, AgentSpec};
use crate::poll::{JobStatusSource, PollConfig, PollingCoordinator};
use crate::workspace::{write_json_atomic, Workspace};
use crate::{Error, Result};

/// Per-request timeout; scan duration is governed by the poll budget,
/// individual HTTP calls should never take this long
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin JSON-over-HTTP client for one scan service
#[derive(Debug, Clone)]
pub struct ServiceClient {
    name: String,
    base_url: String,
    timeout_secs: u64,
    poll_interval_secs: u64,
    http: reqwest::Client,
}

impl ServiceClient {
    pub fn new(name: &str, config: &ServiceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            name: name.to_string(),
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
            poll_interval_secs: config.poll_interval_secs,
            http,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Liveness probe against the service health endpoint
    pub async fn health(&self) -> Result<Value> {
        self.get_json("/api/health").await
    }
}

/// Status source for one submitted scan
struct ScanStatusSource<'a> {
    client: &'a ServiceClient,
    scan_id: &'a str,
}

#[async_trait]
impl JobStatusSource for ScanStatusSource<'_> {
    async fn fetch_status(&self) -> Result<Value> {
        self.client
            .get_json(&format!("/api/scans/{}", self.scan_id))
            .await
    }
}

/// Executor for agents backed by an asynchronous remote scan
pub struct RemoteScanExecutor {
    client: ServiceClient,
    defaults: ScanDefaults,
    query_retries: usize,
}

impl RemoteScanExecutor {
    pub fn new(client: ServiceClient, defaults: ScanDefaults, query_retries: usize) -> Self {
        Self {
            client,
            defaults,
            query_retries,
        }
    }

    fn poll_config(&self) -> PollConfig {
        PollConfig::new(
            Duration::from_secs(self.client.poll_interval_secs),
            Duration::from_secs(self.client.timeout_secs),
        )
        .with_success_states(&["completed"])
        .with_error_states(&["failed", "error", "cancelled"])
        .with_query_retries(self.query_retries)
    }

    async fn download_artifact(
        &self,
        workspace: &Workspace,
        path: &str,
        artifact: &str,
    ) -> Result<()> {
        let body = self.client.get_json(path).await?;
        write_json_atomic(&workspace.artifact_path(artifact), &body)?;
        Ok(())
    }
}

#[async_trait]
impl AgentExecutor for RemoteScanExecutor {
    async fn execute(&self, spec: &AgentSpec, workspace: &Workspace) -> Result<AgentOutcome> {
        let created = self
            .client
            .post_json("/api/scans/", &create_body(spec.id, workspace, &self.defaults)?)
            .await?;
        let scan_id = extract_scan_id(&self.client.name, &created)?;

        self.client
            .post_json(
                &format!("/api/scans/{scan_id}/start"),
                &start_body(spec.id, &self.defaults),
            )
            .await?;
        info!(
            service = self.client.name(),
            %scan_id,
            "scan started, polling until terminal"
        );

        let coordinator = PollingCoordinator::new(self.poll_config());
        let source = ScanStatusSource {
            client: &self.client,
            scan_id: &scan_id,
        };
        coordinator.wait_until_terminal(&source).await?;

        self.download_artifact(
            workspace,
            &format!("/api/scans/{scan_id}/findings"),
            findings_artifact(spec.id)?,
        )
        .await?;
        if let Some((path, artifact)) = export_for(spec.id, &scan_id) {
            self.download_artifact(workspace, &path, artifact).await?;
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

/// Scan creation payload, shaped per service
fn create_body(id: AgentId, workspace: &Workspace, defaults: &ScanDefaults) -> Result<Value> {
    let target = &workspace.meta.target;
    let body = match id {
        AgentId::Recon => json!({ "target": target }),
        AgentId::MobileScan => json!({
            "app_id": target,
            "scan_type": defaults.mobilicustos_scan_type,
        }),
        AgentId::CloudAudit => json!({
            "target": target,
            "profile": defaults.nubicustos_profile,
        }),
        other => {
            return Err(Error::Service(format!(
                "agent '{other}' is not backed by a remote scan"
            )))
        }
    };
    Ok(body)
}

/// Scan start payload; only reticustos takes parameters at start time
fn start_body(id: AgentId, defaults: &ScanDefaults) -> Value {
    match id {
        AgentId::Recon => json!({ "profile": defaults.reticustos_profile }),
        _ => json!({}),
    }
}

fn findings_artifact(id: AgentId) -> Result<&'static str> {
    match id {
        AgentId::Recon => Ok(artifacts::RETICUSTOS_FINDINGS),
        AgentId::MobileScan => Ok(artifacts::MOBILICUSTOS_FINDINGS),
        AgentId::CloudAudit => Ok(artifacts::NUBICUSTOS_FINDINGS),
        other => Err(Error::Service(format!(
            "agent '{other}' is not backed by a remote scan"
        ))),
    }
}

/// Additional per-service export downloaded after the scan completes
fn export_for(id: AgentId, scan_id: &str) -> Option<(String, &'static str)> {
    match id {
        AgentId::Recon => Some((
            format!("/api/exports/endpoints?scan_id={scan_id}"),
            artifacts::RETICUSTOS_ENDPOINTS,
        )),
        AgentId::CloudAudit => Some((
            format!("/api/exports/containers?scan_id={scan_id}"),
            artifacts::NUBICUSTOS_CONTAINERS,
        )),
        _ => None,
    }
}

/// Services disagree on the id field name; accept both
fn extract_scan_id(service: &str, response: &Value) -> Result<String> {
    response
        .get("scan_id")
        .or_else(|| response.get("id"))
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            Error::Service(format!(
                "{service} returned no scan id in create response: {response}"
            ))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::pipeline::TargetType;
    use crate::workspace::WorkspaceStore;
    use tempfile::TempDir;

    fn test_workspace(target: &str, target_type: TargetType) -> (TempDir, Workspace) {
        let temp = TempDir::new().expect("should create temp dir");
        let workspace = WorkspaceStore::new(temp.path())
            .create(target, target_type)
            .expect("should create workspace");
        (temp, workspace)
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let config = ServiceConfig {
            url: "http://localhost:8002/".to_string(),
            timeout_secs: 600,
            poll_interval_secs: 15,
        };
        let client = ServiceClient::new("reticustos", &config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8002");
        assert_eq!(client.name(), "reticustos");
    }

    #[test]
    fn test_extract_scan_id_accepts_both_field_names() {
        let id = extract_scan_id("reticustos", &json!({"scan_id": "abc-1"})).unwrap();
        assert_eq!(id, "abc-1");

        let id = extract_scan_id("mobilicustos", &json!({"id": "xyz-2"})).unwrap();
        assert_eq!(id, "xyz-2");

        let err = extract_scan_id("nubicustos", &json!({"status": "created"})).unwrap_err();
        match err {
            Error::Service(detail) => assert!(detail.contains("nubicustos")),
            other => panic!("expected Service error, got {other:?}"),
        }
    }

    #[test]
    fn test_create_body_per_service() {
        let defaults = ScanDefaults::default();

        let (_temp, workspace) = test_workspace("https://example.com", TargetType::Web);
        let body = create_body(AgentId::Recon, &workspace, &defaults).unwrap();
        assert_eq!(body["target"], "https://example.com");

        let (_temp, workspace) = test_workspace("com.example.app", TargetType::Mobile);
        let body = create_body(AgentId::MobileScan, &workspace, &defaults).unwrap();
        assert_eq!(body["app_id"], "com.example.app");
        assert_eq!(body["scan_type"], "full");

        let (_temp, workspace) = test_workspace("aws:123456789012", TargetType::Cloud);
        let body = create_body(AgentId::CloudAudit, &workspace, &defaults).unwrap();
        assert_eq!(body["target"], "aws:123456789012");
        assert_eq!(body["profile"], "comprehensive");

        assert!(create_body(AgentId::Correlate, &workspace, &defaults).is_err());
    }

    #[test]
    fn test_start_body_profiles() {
        let defaults = ScanDefaults::default();
        assert_eq!(
            start_body(AgentId::Recon, &defaults)["profile"],
            "standard"
        );
        assert_eq!(start_body(AgentId::MobileScan, &defaults), json!({}));
    }

    #[test]
    fn test_exports_per_service() {
        let (path, artifact) = export_for(AgentId::Recon, "s-1").unwrap();
        assert_eq!(path, "/api/exports/endpoints?scan_id=s-1");
        assert_eq!(artifact, artifacts::RETICUSTOS_ENDPOINTS);

        let (path, artifact) = export_for(AgentId::CloudAudit, "s-2").unwrap();
        assert_eq!(path, "/api/exports/containers?scan_id=s-2");
        assert_eq!(artifact, artifacts::NUBICUSTOS_CONTAINERS);

        assert!(export_for(AgentId::MobileScan, "s-3").is_none());
    }
}
