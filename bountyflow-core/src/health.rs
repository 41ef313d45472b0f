//! Preflight checks for remote services and local CLI tools
//!
//! Run before a pipeline to surface dead services and missing binaries
//! up front instead of minutes into a scan. The Docker probe and the
//! HTTP probe are independent; a service running outside Docker still
//! reports healthy when its API responds.

use std::path::PathBuf;
use std::time::Duration;

use bollard::query_parameters::InspectContainerOptions;
use bollard::Docker;
use tracing::{debug, warn};

use crate::config::Config;
use crate::Result;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe results for one remote service
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub name: String,
    pub url: String,
    /// Container state observed through the Docker daemon
    pub container_running: bool,
    pub docker_message: String,
    /// Whether the service health endpoint responded
    pub api_healthy: bool,
    pub api_message: String,
    /// Suggested command when the container is not running
    pub start_hint: Option<String>,
}

impl ServiceHealth {
    /// A responding API is sufficient; Docker state is diagnostics
    pub fn ok(&self) -> bool {
        self.api_healthy
    }
}

/// Filesystem check results for one CLI tool
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub name: String,
    pub path: PathBuf,
    pub found: bool,
    pub executable: bool,
}

impl ToolStatus {
    pub fn ok(&self) -> bool {
        self.found && self.executable
    }
}

/// Check every named service against Docker and its health endpoint
pub async fn check_services(config: &Config, services: &[String]) -> Vec<ServiceHealth> {
    let docker = match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => Some(docker),
            Err(e) => {
                warn!(%e, "docker daemon did not answer ping");
                None
            }
        },
        Err(e) => {
            warn!(%e, "could not connect to docker daemon");
            None
        }
    };

    let mut results = Vec::with_capacity(services.len());
    for name in services {
        results.push(check_one(config, docker.as_ref(), name).await);
    }
    results
}

async fn check_one(config: &Config, docker: Option<&Docker>, name: &str) -> ServiceHealth {
    let docker_config = config.docker.get(name);

    let (container_running, docker_message) = match (docker, docker_config) {
        (Some(docker), Some(cfg)) => {
            match docker
                .inspect_container(&cfg.container, None::<InspectContainerOptions>)
                .await
            {
                Ok(info) => {
                    let running = info
                        .state
                        .and_then(|state| state.running)
                        .unwrap_or(false);
                    let message = if running {
                        format!("container '{}' running", cfg.container)
                    } else {
                        format!("container '{}' present but stopped", cfg.container)
                    };
                    (running, message)
                }
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                }) => (false, format!("container '{}' not found", cfg.container)),
                Err(e) => (false, format!("docker error: {e}")),
            }
        }
        (None, _) => (false, "docker daemon unreachable".to_string()),
        (Some(_), None) => (false, format!("no docker configuration for '{name}'")),
    };

    let (url, api_healthy, api_message) = match config.service(name) {
        Ok(service) => match probe_health(&service.url).await {
            Ok(()) => (service.url.clone(), true, "api responding".to_string()),
            Err(e) => (
                service.url.clone(),
                false,
                format!("api unreachable: {e}"),
            ),
        },
        Err(_) => (
            String::new(),
            false,
            format!("no service configuration for '{name}'"),
        ),
    };

    let start_hint = if container_running {
        None
    } else {
        docker_config.map(|cfg| match &cfg.compose_dir {
            Some(dir) => format!("cd {} && docker compose up -d", dir.display()),
            None => format!("docker start {}", cfg.container),
        })
    };

    debug!(service = name, container_running, api_healthy, "service probed");
    ServiceHealth {
        name: name.to_string(),
        url,
        container_running,
        docker_message,
        api_healthy,
        api_message,
        start_hint,
    }
}

async fn probe_health(url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(HEALTH_PROBE_TIMEOUT)
        .build()?;
    client
        .get(format!("{}/api/health", url.trim_end_matches('/')))
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

/// Check that each named tool resolves to an executable file
pub fn check_cli_tools(config: &Config, tools: &[&str]) -> Vec<ToolStatus> {
    tools
        .iter()
        .map(|name| {
            let configured = config.tool_path(name);
            let path = resolve_binary(&configured);
            let (found, executable) = match &path {
                Some(p) => (true, is_executable(p)),
                None => (false, false),
            };
            ToolStatus {
                name: name.to_string(),
                path: path.unwrap_or(configured),
                found,
                executable,
            }
        })
        .collect()
}

/// Bare names resolve through PATH; anything with a directory
/// component is taken as-is
fn resolve_binary(path: &std::path::Path) -> Option<PathBuf> {
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.is_file())
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}
