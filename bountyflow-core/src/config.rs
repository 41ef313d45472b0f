//! Layered configuration for pipeline runs
//!
//! Built once at startup from three ordered merge passes: built-in
//! defaults, then `~/.bountyflow/config.toml` (or an explicit file),
//! then `BOUNTYFLOW_*` environment overrides. Components receive the
//! resulting immutable value explicitly; nothing reads ambient state.
//!
//! Env vars use double underscores for nesting:
//!   BOUNTYFLOW_SERVICES__RETICUSTOS__URL=http://localhost:9000

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const ENV_PREFIX: &str = "BOUNTYFLOW_";

/// One remote REST service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub url: String,
    /// Wall-clock polling budget for a single scan
    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_service_timeout() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    15
}

/// Docker presence of one remote service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Container name to inspect for a running state
    pub container: String,
    /// Compose project directory, used for the start-command hint
    #[serde(default)]
    pub compose_dir: Option<PathBuf>,
}

/// Default scan parameters passed to the services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanDefaults {
    #[serde(default = "default_reticustos_profile")]
    pub reticustos_profile: String,
    #[serde(default = "default_nubicustos_profile")]
    pub nubicustos_profile: String,
    #[serde(default = "default_mobilicustos_scan_type")]
    pub mobilicustos_scan_type: String,
}

fn default_reticustos_profile() -> String {
    "standard".to_string()
}

fn default_nubicustos_profile() -> String {
    "comprehensive".to_string()
}

fn default_mobilicustos_scan_type() -> String {
    "full".to_string()
}

impl Default for ScanDefaults {
    fn default() -> Self {
        Self {
            reticustos_profile: default_reticustos_profile(),
            nubicustos_profile: default_nubicustos_profile(),
            mobilicustos_scan_type: default_mobilicustos_scan_type(),
        }
    }
}

/// Workspace storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: home_relative(".bountyflow/runs"),
        }
    }
}

/// Status-query retry settings shared by the polling executors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_query_retries")]
    pub query_retries: usize,
}

fn default_query_retries() -> usize {
    3
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            query_retries: default_query_retries(),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    /// CLI tool name to binary path
    #[serde(default)]
    pub tools: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub defaults: ScanDefaults,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub docker: BTreeMap<String, DockerConfig>,
    #[serde(default)]
    pub polling: PollingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        services.insert(
            "reticustos".to_string(),
            ServiceConfig {
                url: "http://localhost:8002".to_string(),
                timeout_secs: 600,
                poll_interval_secs: 15,
            },
        );
        services.insert(
            "mobilicustos".to_string(),
            ServiceConfig {
                url: "http://localhost:8000".to_string(),
                timeout_secs: 900,
                poll_interval_secs: 15,
            },
        );
        services.insert(
            "nubicustos".to_string(),
            ServiceConfig {
                url: "http://localhost:8001".to_string(),
                timeout_secs: 1800,
                poll_interval_secs: 30,
            },
        );

        let mut tools = BTreeMap::new();
        for tool in ["indago", "burrito", "cepheus", "vinculum", "ariadne"] {
            tools.insert(tool.to_string(), PathBuf::from(tool));
        }

        let mut docker = BTreeMap::new();
        for service in ["reticustos", "mobilicustos", "nubicustos"] {
            docker.insert(
                service.to_string(),
                DockerConfig {
                    container: service.to_string(),
                    compose_dir: None,
                },
            );
        }

        Self {
            services,
            tools,
            defaults: ScanDefaults::default(),
            workspace: WorkspaceConfig::default(),
            docker,
            polling: PollingConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        home_relative(".bountyflow/config.toml")
    }

    /// Build the configuration from the three merge passes
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut value = toml::Value::try_from(Config::default())
            .map_err(|e| Error::Config(e.to_string()))?;

        let path = file.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let overlay: toml::Value = toml::from_str(&content)?;
            deep_merge(&mut value, overlay);
        }

        apply_env_overrides(&mut value, std::env::vars());

        let mut config: Config = value.try_into()?;
        config.expand_paths();
        Ok(config)
    }

    /// Parse a configuration overlaid on the defaults, without
    /// touching the filesystem or environment
    pub fn parse(content: &str) -> Result<Self> {
        let mut value = toml::Value::try_from(Config::default())
            .map_err(|e| Error::Config(e.to_string()))?;
        let overlay: toml::Value = toml::from_str(content)?;
        deep_merge(&mut value, overlay);
        let mut config: Config = value.try_into()?;
        config.expand_paths();
        Ok(config)
    }

    /// Configuration for a named service
    pub fn service(&self, name: &str) -> Result<&ServiceConfig> {
        self.services
            .get(name)
            .ok_or_else(|| Error::Config(format!("no configuration for service '{name}'")))
    }

    /// Binary path for a named CLI tool; bare names resolve via PATH
    pub fn tool_path(&self, name: &str) -> PathBuf {
        self.tools
            .get(name)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(name))
    }

    /// Expand a leading `~` in path-valued fields
    fn expand_paths(&mut self) {
        self.workspace.root = expand_tilde(&self.workspace.root);
        for path in self.tools.values_mut() {
            *path = expand_tilde(path);
        }
        for docker in self.docker.values_mut() {
            if let Some(dir) = docker.compose_dir.take() {
                docker.compose_dir = Some(expand_tilde(&dir));
            }
        }
    }
}

fn home_relative(suffix: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(suffix)
}

fn expand_tilde(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = s.strip_prefix("~/") {
        home_relative(rest)
    } else {
        path.to_path_buf()
    }
}

/// Merge `overlay` into `base`; tables merge recursively, everything
/// else replaces
fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply `BOUNTYFLOW_*` overrides; `__` denotes nesting and numeric
/// values are converted when they parse
fn apply_env_overrides(
    value: &mut toml::Value,
    vars: impl Iterator<Item = (String, String)>,
) {
    for (key, raw) in vars {
        let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let parts: Vec<String> = stripped.to_lowercase().split("__").map(String::from).collect();
        if parts.iter().any(String::is_empty) {
            continue;
        }

        let leaf = if let Ok(n) = raw.parse::<i64>() {
            toml::Value::Integer(n)
        } else if let Ok(f) = raw.parse::<f64>() {
            toml::Value::Float(f)
        } else {
            toml::Value::String(raw)
        };

        insert_nested(value, &parts, leaf);
    }
}

/// Set `parts`-addressed key to `leaf`, creating intermediate tables
fn insert_nested(root: &mut toml::Value, parts: &[String], leaf: toml::Value) {
    let mut current = root;
    for part in &parts[..parts.len() - 1] {
        if !current.is_table() {
            *current = toml::Value::Table(toml::map::Map::new());
        }
        let toml::Value::Table(table) = current else {
            return;
        };
        current = table
            .entry(part.clone())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    if !current.is_table() {
        *current = toml::Value::Table(toml::map::Map::new());
    }
    if let toml::Value::Table(table) = current {
        table.insert(parts[parts.len() - 1].clone(), leaf);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.service("reticustos").unwrap().url, "http://localhost:8002");
        assert_eq!(config.service("nubicustos").unwrap().timeout_secs, 1800);
        assert_eq!(config.defaults.reticustos_profile, "standard");
        assert_eq!(config.polling.query_retries, 3);
        assert!(config.workspace.root.ends_with(".bountyflow/runs"));
    }

    #[test]
    fn test_unknown_service() {
        let config = Config::default();
        assert!(matches!(config.service("ghost"), Err(Error::Config(_))));
    }

    #[test]
    fn test_file_overlay_deep_merges() {
        let config = Config::parse(
            r#"
[services.reticustos]
url = "http://scanner:9000"

[tools]
indago = "/opt/indago/indago"
"#,
        )
        .unwrap();

        // Overridden value
        assert_eq!(config.service("reticustos").unwrap().url, "http://scanner:9000");
        // Sibling defaults survive the merge
        assert_eq!(config.service("reticustos").unwrap().poll_interval_secs, 15);
        assert_eq!(config.service("mobilicustos").unwrap().url, "http://localhost:8000");
        assert_eq!(config.tool_path("indago"), PathBuf::from("/opt/indago/indago"));
        assert_eq!(config.tool_path("burrito"), PathBuf::from("burrito"));
    }

    #[test]
    fn test_env_override_nesting_and_numbers() {
        let mut value = toml::Value::try_from(Config::default()).unwrap();
        let vars = vec![
            (
                "BOUNTYFLOW_SERVICES__RETICUSTOS__URL".to_string(),
                "http://localhost:9000".to_string(),
            ),
            (
                "BOUNTYFLOW_SERVICES__RETICUSTOS__TIMEOUT_SECS".to_string(),
                "1200".to_string(),
            ),
            ("UNRELATED_VAR".to_string(), "ignored".to_string()),
        ];
        apply_env_overrides(&mut value, vars.into_iter());

        let config: Config = value.try_into().unwrap();
        let reticustos = config.service("reticustos").unwrap();
        assert_eq!(reticustos.url, "http://localhost:9000");
        assert_eq!(reticustos.timeout_secs, 1200);
    }

    #[test]
    fn test_tool_path_falls_back_to_name() {
        let config = Config::default();
        assert_eq!(config.tool_path("nmap"), PathBuf::from("nmap"));
    }

    #[test]
    fn test_tilde_expansion() {
        let config = Config::parse(
            r#"
[workspace]
root = "~/pipeline-runs"
"#,
        )
        .unwrap();
        assert!(!config.workspace.root.to_str().unwrap().starts_with('~'));
        assert!(config.workspace.root.ends_with("pipeline-runs"));
    }
}
