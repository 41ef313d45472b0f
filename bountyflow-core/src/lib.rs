//! bountyflow-core: multi-phase security-assessment pipeline engine

#![allow(clippy::missing_errors_doc)]

pub mod agents;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod pipeline;
pub mod poll;
pub mod report;
pub mod workspace;

pub use error::{Error, Result};
