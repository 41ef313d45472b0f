//! Workspace management for pipeline runs
//!
//! Each run gets a directory under the workspace root holding the
//! metadata record, per-phase checkpoints, and agent output artifacts.
//! Directory names sort lexicographically in creation order, so a
//! reverse listing is reverse chronological.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pipeline::TargetType;
use crate::{Error, Result};

const META_FILE: &str = "run-meta.json";
const CHECKPOINT_DIR: &str = "checkpoints";
const MAX_TARGET_LEN: usize = 80;

/// Lexicographically sortable UTC timestamp, second precision
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Initialized,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Initialized => "initialized",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Persistent metadata record for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    /// Raw, user-supplied target identifier
    pub target: String,
    pub target_type: TargetType,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Completed phase identifiers, insertion order, no duplicates
    pub phases_completed: Vec<String>,
    /// Workspace path, recorded for convenience on read
    pub workspace: PathBuf,
}

/// A run workspace: directory plus its metadata record
#[derive(Debug, Clone)]
pub struct Workspace {
    pub path: PathBuf,
    pub meta: RunMeta,
}

impl Workspace {
    /// Path of an artifact file within the workspace
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Whether an artifact exists and carries any findings.
    /// A missing file, a zero-length file, or an empty JSON
    /// array/object all count as "no findings".
    pub fn artifact_has_content(&self, name: &str) -> bool {
        let path = self.artifact_path(name);
        let Ok(content) = fs::read_to_string(&path) else {
            return false;
        };
        if content.trim().is_empty() {
            return false;
        }
        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Array(items)) => !items.is_empty(),
            Ok(serde_json::Value::Object(map)) => !map.is_empty(),
            Ok(serde_json::Value::Null) => false,
            _ => true,
        }
    }
}

/// Checkpoint record written once per completed phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub phase: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Sanitize a target string for use as a directory name: every
/// character outside `[A-Za-z0-9_.-]` becomes `_`, capped at 80 chars.
pub fn sanitize_target(target: &str) -> String {
    target
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TARGET_LEN)
        .collect()
}

/// Durable per-run storage rooted at a single directory
pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new run workspace with initial metadata
    pub fn create(&self, target: &str, target_type: TargetType) -> Result<Workspace> {
        let created_at = Utc::now();
        let name = format!(
            "{}-{}",
            sanitize_target(target),
            created_at.format(TIMESTAMP_FORMAT)
        );
        let path = self.root.join(name);

        fs::create_dir_all(&path)
            .map_err(|e| Error::WorkspaceCreate(format!("{}: {e}", path.display())))?;

        let meta = RunMeta {
            target: target.to_string(),
            target_type,
            created_at,
            updated_at: None,
            status: RunStatus::Initialized,
            phases_completed: Vec::new(),
            workspace: path.clone(),
        };
        write_json_atomic(&path.join(META_FILE), &meta)?;

        debug!(workspace = %path.display(), "created workspace");
        Ok(Workspace { path, meta })
    }

    /// Load an existing workspace from its directory
    pub fn load(path: impl AsRef<Path>) -> Result<Workspace> {
        let path = path.as_ref().to_path_buf();
        let meta_file = path.join(META_FILE);
        if !meta_file.exists() {
            return Err(Error::WorkspaceNotFound(path.display().to_string()));
        }
        let meta: RunMeta = serde_json::from_str(&fs::read_to_string(meta_file)?)?;
        Ok(Workspace { path, meta })
    }

    /// Update run status and optionally record a completed phase.
    /// Appending the same phase twice is a no-op.
    pub fn update_status(
        &self,
        workspace: &mut Workspace,
        status: RunStatus,
        completed_phase: Option<&str>,
    ) -> Result<()> {
        // Read-modify-write against the on-disk record; the engine is
        // the only writer, so this cannot race.
        let mut meta = Self::load(&workspace.path)?.meta;
        meta.status = status;
        meta.updated_at = Some(Utc::now());
        if let Some(phase) = completed_phase {
            if !meta.phases_completed.iter().any(|p| p == phase) {
                meta.phases_completed.push(phase.to_string());
            }
        }
        write_json_atomic(&workspace.path.join(META_FILE), &meta)?;
        workspace.meta = meta;
        Ok(())
    }

    /// Write (or replace) the checkpoint for a phase
    pub fn save_checkpoint(
        &self,
        workspace: &Workspace,
        phase: &str,
        data: serde_json::Value,
    ) -> Result<PathBuf> {
        let dir = workspace.path.join(CHECKPOINT_DIR);
        fs::create_dir_all(&dir)?;
        let checkpoint = Checkpoint {
            phase: phase.to_string(),
            timestamp: Utc::now(),
            data,
        };
        let file = dir.join(format!("{phase}.json"));
        write_json_atomic(&file, &checkpoint)?;
        Ok(file)
    }

    /// Load the checkpoint for a phase; absence means the phase has
    /// not completed yet and is not an error
    pub fn load_checkpoint(
        &self,
        workspace: &Workspace,
        phase: &str,
    ) -> Result<Option<Checkpoint>> {
        let file = workspace.path.join(CHECKPOINT_DIR).join(format!("{phase}.json"));
        if !file.exists() {
            return Ok(None);
        }
        let checkpoint: Checkpoint = serde_json::from_str(&fs::read_to_string(file)?)?;
        Ok(Some(checkpoint))
    }

    /// Most recent workspace, optionally filtered to a target
    pub fn find_latest(&self, target: Option<&str>) -> Result<Option<Workspace>> {
        let prefix = target.map(sanitize_target);
        for path in self.entries_newest_first()? {
            if let Some(ref prefix) = prefix {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default();
                if !name.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if let Ok(workspace) = Self::load(&path) {
                return Ok(Some(workspace));
            }
        }
        Ok(None)
    }

    /// Recent workspaces, newest first, capped at `limit`; entries
    /// without a valid metadata record are skipped
    pub fn list(&self, limit: usize) -> Result<Vec<Workspace>> {
        let mut results = Vec::new();
        for path in self.entries_newest_first()? {
            if let Ok(workspace) = Self::load(&path) {
                results.push(workspace);
                if results.len() >= limit {
                    break;
                }
            }
        }
        Ok(results)
    }

    /// Workspace directories in reverse lexicographic name order
    fn entries_newest_first(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();
        dirs.reverse();
        Ok(dirs)
    }
}

/// Write a JSON record via temp-file-then-rename so an interrupted
/// process never leaves a truncated record behind
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
