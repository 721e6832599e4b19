//! Typed error hierarchy for pageforge.
//!
//! Four top-level enums cover the four subsystems:
//! - `SectionError`: marker parsing, extraction and merging
//! - `AgentError`: external agent invocation failures
//! - `StoreError`: project record persistence failures
//! - `PipelineError`: caller-facing orchestrator failures
//!
//! Phase-level failures inside an operation are not errors of the operation
//! itself; they are reported as a [`FailureKind`] in the operation report.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::PhaseState;

/// Errors from parsing or rewriting a section-addressable document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SectionError {
    #[error("Malformed section markers at byte {offset}: {reason}")]
    MalformedMarkers { offset: usize, reason: String },

    #[error("Unknown section '{name}' (available: {})", .available.join(", "))]
    UnknownSection { name: String, available: Vec<String> },

    #[error("Merge would break the document structure: {reason}")]
    MergeInvariantViolation { reason: String },
}

/// Errors from a single call to the external generative agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent did not respond within {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("Failed to spawn agent process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agent exited with non-zero code {exit_code}: {message}")]
    NonZeroExit { exit_code: i32, message: String },

    #[error("Agent reported an error: {0}")]
    Reported(String),

    #[error("Agent invocation cancelled")]
    Cancelled,
}

/// Errors from loading or saving a project record.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No project record found at {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Project record at {} is corrupt: {reason}", .path.display())]
    CorruptRecord { path: PathBuf, reason: String },

    #[error("Project document missing at {}", .path.display())]
    MissingDocument { path: PathBuf },

    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize project record: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Save cancelled before the record was published")]
    Cancelled,
}

/// Caller-facing errors from the generation orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unknown section '{name}' (available: {})", .available.join(", "))]
    UnknownSection { name: String, available: Vec<String> },

    #[error("No sections requested")]
    NoSections,

    #[error("Project document is not section-addressable: {0}")]
    Document(#[from] SectionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid phase transition {from} -> {to} in phase '{phase}'")]
    InvalidTransition {
        phase: String,
        from: PhaseState,
        to: PhaseState,
    },

    #[error("Phase '{phase}' failed ({kind}): {message}")]
    PhaseFailed {
        phase: String,
        kind: FailureKind,
        message: String,
    },
}

/// Why a phase ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AgentTimeout,
    AgentError,
    ValidationRejected,
    MergeInvariantViolation,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::AgentTimeout => write!(f, "agent timeout"),
            FailureKind::AgentError => write!(f, "agent error"),
            FailureKind::ValidationRejected => write!(f, "validation rejected"),
            FailureKind::MergeInvariantViolation => write!(f, "merge invariant violation"),
        }
    }
}
