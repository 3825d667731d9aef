//! Error types for the end-to-end harness

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Command `{command}` failed with {status}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    NonZeroExit {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("Timeout after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("CSS in {path} does not include the expected rules:\n{report}")]
    AssertionMismatch { path: String, report: String },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] cssbuild_common::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
