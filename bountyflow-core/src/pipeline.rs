//! Pipeline catalogue: which agents run in which order per target type
//!
//! Phases execute sequentially; agents within a phase run in parallel.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Workspace artifact file names shared between agents
pub mod artifacts {
    pub const RETICUSTOS_FINDINGS: &str = "reticustos-findings.json";
    pub const RETICUSTOS_ENDPOINTS: &str = "reticustos-endpoints.json";
    pub const INDAGO_REPORT: &str = "indago-report.json";
    pub const WAF_BLOCKED: &str = "waf-blocked.json";
    pub const BURRITO_REPORT: &str = "burrito-report.json";
    pub const MOBILICUSTOS_FINDINGS: &str = "mobilicustos-findings.json";
    pub const NUBICUSTOS_FINDINGS: &str = "nubicustos-findings.json";
    pub const NUBICUSTOS_CONTAINERS: &str = "nubicustos-containers.json";
    pub const CEPHEUS_REPORT: &str = "cepheus-report.json";
    pub const VINCULUM_CORRELATED: &str = "vinculum-correlated.json";
    pub const VINCULUM_ARIADNE: &str = "vinculum-ariadne.json";
    pub const ARIADNE_REPORT: &str = "ariadne-report.json";
}

/// Target category selecting which pipeline definition applies
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Web,
    Mobile,
    Cloud,
    Full,
    Api,
}

impl TargetType {
    pub const ALL: [TargetType; 5] = [
        TargetType::Web,
        TargetType::Mobile,
        TargetType::Cloud,
        TargetType::Full,
        TargetType::Api,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Web => "web",
            TargetType::Mobile => "mobile",
            TargetType::Cloud => "cloud",
            TargetType::Full => "full",
            TargetType::Api => "api",
        }
    }

    /// Parse a user-supplied target type, rejecting anything unrecognized
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_lowercase().as_str() {
            "web" => Ok(TargetType::Web),
            "mobile" => Ok(TargetType::Mobile),
            "cloud" => Ok(TargetType::Cloud),
            "full" => Ok(TargetType::Full),
            "api" => Ok(TargetType::Api),
            other => Err(Error::UnknownTargetType(other.to_string())),
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier for a unit of work within a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentId {
    Recon,
    ApiFuzz,
    WafBypass,
    MobileScan,
    CloudAudit,
    ContainerEscape,
    Correlate,
    AttackPaths,
}

impl AgentId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Recon => "recon",
            AgentId::ApiFuzz => "api-fuzz",
            AgentId::WafBypass => "waf-bypass",
            AgentId::MobileScan => "mobile-scan",
            AgentId::CloudAudit => "cloud-audit",
            AgentId::ContainerEscape => "container-escape",
            AgentId::Correlate => "correlate",
            AgentId::AttackPaths => "attack-paths",
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one agent: the services it needs, the
/// workspace artifacts it reads and writes, and an optional gate.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub id: AgentId,
    /// External services the agent depends on
    pub services: &'static [&'static str],
    /// Artifacts consumed from earlier phases
    pub inputs: &'static [&'static str],
    /// Artifacts the agent must write on success
    pub outputs: &'static [&'static str],
    /// Skip the agent when this artifact is absent or empty
    pub gate: Option<&'static str>,
}

impl AgentSpec {
    fn for_agent(id: AgentId) -> Self {
        use artifacts::*;
        match id {
            AgentId::Recon => Self {
                id,
                services: &["reticustos"],
                inputs: &[],
                outputs: &[RETICUSTOS_FINDINGS, RETICUSTOS_ENDPOINTS],
                gate: None,
            },
            AgentId::ApiFuzz => Self {
                id,
                services: &[],
                inputs: &[RETICUSTOS_ENDPOINTS],
                outputs: &[INDAGO_REPORT, WAF_BLOCKED],
                gate: None,
            },
            AgentId::WafBypass => Self {
                id,
                services: &[],
                inputs: &[WAF_BLOCKED],
                outputs: &[BURRITO_REPORT],
                gate: Some(WAF_BLOCKED),
            },
            AgentId::MobileScan => Self {
                id,
                services: &["mobilicustos"],
                inputs: &[],
                outputs: &[MOBILICUSTOS_FINDINGS],
                gate: None,
            },
            AgentId::CloudAudit => Self {
                id,
                services: &["nubicustos"],
                inputs: &[],
                outputs: &[NUBICUSTOS_FINDINGS, NUBICUSTOS_CONTAINERS],
                gate: None,
            },
            AgentId::ContainerEscape => Self {
                id,
                services: &[],
                inputs: &[NUBICUSTOS_CONTAINERS],
                outputs: &[CEPHEUS_REPORT],
                gate: None,
            },
            AgentId::Correlate => Self {
                id,
                services: &[],
                // Ingests every *.json report present in the workspace
                inputs: &[],
                outputs: &[VINCULUM_CORRELATED, VINCULUM_ARIADNE],
                gate: None,
            },
            AgentId::AttackPaths => Self {
                id,
                services: &[],
                inputs: &[VINCULUM_ARIADNE],
                outputs: &[ARIADNE_REPORT],
                gate: None,
            },
        }
    }
}

/// One step of a pipeline containing agents that may run concurrently
#[derive(Debug, Clone)]
pub struct Phase {
    /// Agent ids joined with `+`; equals the agent id for single-agent phases
    pub id: String,
    pub agents: Vec<AgentSpec>,
}

impl Phase {
    fn new(agents: &[AgentId]) -> Self {
        let id = agents
            .iter()
            .map(AgentId::as_str)
            .collect::<Vec<_>>()
            .join("+");
        Self {
            id,
            agents: agents.iter().map(|a| AgentSpec::for_agent(*a)).collect(),
        }
    }
}

/// Static catalogue mapping target types to phase sequences
pub struct PipelineRegistry {
    pipelines: BTreeMap<TargetType, Vec<Phase>>,
}

impl PipelineRegistry {
    /// Build the registry with the built-in pipeline catalogue
    pub fn new() -> Self {
        use AgentId::*;
        let mut pipelines = BTreeMap::new();
        pipelines.insert(
            TargetType::Web,
            vec![
                Phase::new(&[Recon]),
                Phase::new(&[ApiFuzz]),
                Phase::new(&[WafBypass]),
                Phase::new(&[Correlate]),
                Phase::new(&[AttackPaths]),
            ],
        );
        pipelines.insert(
            TargetType::Mobile,
            vec![
                Phase::new(&[MobileScan]),
                Phase::new(&[Correlate]),
                Phase::new(&[AttackPaths]),
            ],
        );
        pipelines.insert(
            TargetType::Cloud,
            vec![
                Phase::new(&[CloudAudit]),
                Phase::new(&[ContainerEscape]),
                Phase::new(&[Correlate]),
                Phase::new(&[AttackPaths]),
            ],
        );
        pipelines.insert(
            TargetType::Full,
            vec![
                Phase::new(&[Recon, MobileScan, CloudAudit]),
                Phase::new(&[ApiFuzz, ContainerEscape]),
                Phase::new(&[WafBypass]),
                Phase::new(&[Correlate]),
                Phase::new(&[AttackPaths]),
            ],
        );
        pipelines.insert(
            TargetType::Api,
            vec![
                Phase::new(&[ApiFuzz]),
                Phase::new(&[WafBypass]),
                Phase::new(&[Correlate]),
                Phase::new(&[AttackPaths]),
            ],
        );
        Self { pipelines }
    }

    /// Get the ordered phase sequence for a target type
    pub fn phases_for(&self, target_type: TargetType) -> Result<&[Phase]> {
        self.pipelines
            .get(&target_type)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownTargetType(target_type.to_string()))
    }

    /// Union of service dependencies across all agents of a pipeline,
    /// deduplicated and sorted for deterministic reporting
    pub fn required_services(&self, target_type: TargetType) -> Result<Vec<String>> {
        let phases = self.phases_for(target_type)?;
        let services: BTreeSet<&str> = phases
            .iter()
            .flat_map(|p| p.agents.iter())
            .flat_map(|a| a.services.iter().copied())
            .collect();
        Ok(services.into_iter().map(String::from).collect())
    }

    /// Human-readable description of a pipeline's phase plan
    pub fn describe(&self, target_type: TargetType) -> Result<String> {
        let phases = self.phases_for(target_type)?;
        let mut lines = vec![format!("Pipeline: {target_type}")];
        for (i, phase) in phases.iter().enumerate() {
            let agents = phase
                .agents
                .iter()
                .map(|a| a.id.as_str())
                .collect::<Vec<_>>()
                .join(" + ");
            lines.push(format!("  Phase {}: {agents}", i + 1));
        }
        Ok(lines.join("\n"))
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_target_type_parse() {
        assert_eq!(TargetType::parse("web").unwrap(), TargetType::Web);
        assert_eq!(TargetType::parse("  API ").unwrap(), TargetType::Api);
        assert!(matches!(
            TargetType::parse("desktop"),
            Err(Error::UnknownTargetType(t)) if t == "desktop"
        ));
    }

    #[test]
    fn test_all_target_types_registered() {
        let registry = PipelineRegistry::new();
        for target_type in TargetType::ALL {
            let phases = registry.phases_for(target_type).unwrap();
            assert!(!phases.is_empty());
        }
    }

    #[test]
    fn test_web_pipeline_order() {
        let registry = PipelineRegistry::new();
        let phases = registry.phases_for(TargetType::Web).unwrap();
        let ids: Vec<&str> = phases.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["recon", "api-fuzz", "waf-bypass", "correlate", "attack-paths"]
        );
    }

    #[test]
    fn test_full_pipeline_phase_ids() {
        let registry = PipelineRegistry::new();
        let phases = registry.phases_for(TargetType::Full).unwrap();
        assert_eq!(phases[0].id, "recon+mobile-scan+cloud-audit");
        assert_eq!(phases[0].agents.len(), 3);
        assert_eq!(phases[1].id, "api-fuzz+container-escape");
    }

    #[test]
    fn test_required_services_sorted_union() {
        let registry = PipelineRegistry::new();

        // Full pipeline spans three services across two phases
        let services = registry.required_services(TargetType::Full).unwrap();
        assert_eq!(services, vec!["mobilicustos", "nubicustos", "reticustos"]);

        // API pipeline is CLI-only
        let services = registry.required_services(TargetType::Api).unwrap();
        assert!(services.is_empty());

        let services = registry.required_services(TargetType::Web).unwrap();
        assert_eq!(services, vec!["reticustos"]);
    }

    #[test]
    fn test_waf_bypass_is_gated() {
        let registry = PipelineRegistry::new();
        let phases = registry.phases_for(TargetType::Web).unwrap();
        let waf = phases
            .iter()
            .flat_map(|p| p.agents.iter())
            .find(|a| a.id == AgentId::WafBypass)
            .unwrap();
        assert_eq!(waf.gate, Some(artifacts::WAF_BLOCKED));
    }

    #[test]
    fn test_describe_lists_phases() {
        let registry = PipelineRegistry::new();
        let description = registry.describe(TargetType::Cloud).unwrap();
        assert!(description.contains("Pipeline: cloud"));
        assert!(description.contains("Phase 1: cloud-audit"));
        assert!(description.contains("Phase 2: container-escape"));
    }
}
