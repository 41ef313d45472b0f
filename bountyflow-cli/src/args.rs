//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "bountyflow")]
#[command(author, version, about = "Multi-phase security assessment pipelines")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a new pipeline run against a target
    Run {
        /// Target identifier (URL, mobile app id, or cloud account)
        #[arg(long)]
        target: String,

        /// Target type (web, mobile, cloud, full, api)
        #[arg(long = "type", value_name = "TYPE", default_value = "web")]
        target_type: String,

        /// Skip the service and tool preflight check
        #[arg(long)]
        skip_preflight: bool,
    },

    /// Resume an interrupted run from its last checkpoint
    Resume {
        /// Workspace directory of the run to resume
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Resume the latest run for this target instead
        #[arg(long, conflicts_with = "workspace")]
        target: Option<String>,
    },

    /// Check remote service and CLI tool availability
    CheckServices {
        /// Only check services required by this target type
        #[arg(long = "type", value_name = "TYPE")]
        target_type: Option<String>,
    },

    /// Show metadata and artifacts of a run
    Status {
        /// Workspace directory; defaults to the most recent run
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// List recent runs, newest first
    ListRuns {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}
