//! Plain-text rendering of preflight results and run state

use std::fmt::Write as _;

use chrono::SecondsFormat;

use crate::health::{ServiceHealth, ToolStatus};
use crate::workspace::Workspace;
use crate::Result;

/// Render service and tool preflight results
pub fn format_status_report(services: &[ServiceHealth], tools: &[ToolStatus]) -> String {
    let mut out = String::new();

    if !services.is_empty() {
        out.push_str("Services:\n");
        for service in services {
            let marker = if service.ok() { "OK  " } else { "DOWN" };
            let _ = writeln!(out, "  [{marker}] {:<14} {}", service.name, service.url);
            let _ = writeln!(out, "         docker: {}", service.docker_message);
            let _ = writeln!(out, "         api:    {}", service.api_message);
            if let Some(hint) = &service.start_hint {
                let _ = writeln!(out, "         start:  {hint}");
            }
        }
    }

    out.push_str("Tools:\n");
    for tool in tools {
        let marker = if tool.ok() {
            "OK  "
        } else if tool.found {
            "PERM"
        } else {
            "MISS"
        };
        let _ = writeln!(out, "  [{marker}] {:<14} {}", tool.name, tool.path.display());
    }

    out
}

/// Render one run's metadata and its artifact inventory
pub fn format_run_summary(workspace: &Workspace) -> Result<String> {
    let meta = &workspace.meta;
    let mut out = String::new();

    let _ = writeln!(out, "Run: {}", workspace.path.display());
    let _ = writeln!(out, "  target:  {} ({})", meta.target, meta.target_type);
    let _ = writeln!(out, "  status:  {}", meta.status.as_str());
    let _ = writeln!(
        out,
        "  created: {}",
        meta.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    if let Some(updated) = meta.updated_at {
        let _ = writeln!(
            out,
            "  updated: {}",
            updated.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }
    let _ = writeln!(
        out,
        "  phases:  {}",
        if meta.phases_completed.is_empty() {
            "(none)".to_string()
        } else {
            meta.phases_completed.join(", ")
        }
    );

    let artifacts = artifact_inventory(workspace)?;
    if artifacts.is_empty() {
        out.push_str("  artifacts: (none)\n");
    } else {
        out.push_str("  artifacts:\n");
        for (name, size) in artifacts {
            let _ = writeln!(out, "    {name:<28} {size} bytes");
        }
    }

    Ok(out)
}

/// Render recent runs as one line each, newest first
pub fn format_run_list(runs: &[Workspace]) -> String {
    if runs.is_empty() {
        return "No runs found.\n".to_string();
    }
    let mut out = String::new();
    for workspace in runs {
        let meta = &workspace.meta;
        let _ = writeln!(
            out,
            "{}  {:<9} {:<7} {}",
            meta.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            meta.status.as_str(),
            meta.target_type.as_str(),
            meta.target,
        );
    }
    out
}

/// Report artifacts in the workspace, name and byte size, sorted
fn artifact_inventory(workspace: &Workspace) -> Result<Vec<(String, u64)>> {
    let mut artifacts = Vec::new();
    for entry in std::fs::read_dir(&workspace.path)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == "run-meta.json" {
            continue;
        }
        artifacts.push((name.to_string(), entry.metadata()?.len()));
    }
    artifacts.sort();
    Ok(artifacts)
}
