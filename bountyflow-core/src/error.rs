//! Error types for bountyflow-core

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using bountyflow Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for bountyflow
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(bountyflow::config))]
    Config(String),

    #[error("Unknown target type: {0}")]
    #[diagnostic(code(bountyflow::target_type))]
    UnknownTargetType(String),

    #[error("Failed to create workspace: {0}")]
    #[diagnostic(code(bountyflow::workspace_create))]
    WorkspaceCreate(String),

    #[error("No workspace found at: {0}")]
    #[diagnostic(code(bountyflow::workspace_not_found))]
    WorkspaceNotFound(String),

    #[error("Remote job failed with status '{status}': {response}")]
    #[diagnostic(code(bountyflow::job_failed))]
    JobFailed { status: String, response: String },

    #[error("Polling timed out after {waited_secs}s (last status: {last_status})")]
    #[diagnostic(code(bountyflow::poll_timeout))]
    PollTimeout { waited_secs: u64, last_status: String },

    #[error("Tool execution error: {0}")]
    #[diagnostic(code(bountyflow::tool))]
    Tool(String),

    #[error("Service error: {0}")]
    #[diagnostic(code(bountyflow::service))]
    Service(String),

    #[error("Agent '{agent}' failed: {detail}")]
    #[diagnostic(code(bountyflow::agent))]
    AgentFailed { agent: String, detail: String },

    #[error("Docker error: {0}")]
    #[diagnostic(code(bountyflow::docker))]
    Docker(#[from] bollard::errors::Error),

    #[error("HTTP error: {0}")]
    #[diagnostic(code(bountyflow::http))]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(bountyflow::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(bountyflow::serde))]
    Serde(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    #[diagnostic(code(bountyflow::toml))]
    Toml(#[from] toml::de::Error),
}
