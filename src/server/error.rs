//! Structured error types for the test explorer.
//!
//! Tree consistency problems are developer diagnostics only; the variants that
//! reach the user are the run-start failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("No test item '{missing}' on the path to '{fqcn}' in target {target}")]
    BrokenPath {
        target: String,
        fqcn: String,
        missing: String,
    },

    #[error("Test discovery failed: {reason}")]
    Discovery { reason: String },

    #[error("No debug server for target {target}")]
    DebugServerUnavailable { target: String },

    #[error("Failed to launch debug session: {reason}")]
    Launch { reason: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExplorerError {
    /// Create a BrokenPath error for a walk that stopped at `missing`.
    pub fn broken_path(target: &str, fqcn: &str, missing: &str) -> Self {
        Self::BrokenPath {
            target: target.to_string(),
            fqcn: fqcn.to_string(),
            missing: missing.to_string(),
        }
    }

    /// Create a Discovery error from anything displayable.
    pub fn discovery(reason: impl std::fmt::Display) -> Self {
        Self::Discovery {
            reason: reason.to_string(),
        }
    }

    /// Create a Launch error from anything displayable.
    pub fn launch(reason: impl std::fmt::Display) -> Self {
        Self::Launch {
            reason: reason.to_string(),
        }
    }

    /// Whether the error only concerns the shape of the test tree.
    pub fn is_broken_path(&self) -> bool {
        matches!(self, Self::BrokenPath { .. })
    }
}
