//! Error types for the compxgan-core crate.

use crate::experiment::validate::ValidationReport;
use thiserror::Error;

/// Top-level error type for harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Experiment configuration is invalid:\n{0}")]
    Validation(ValidationReport),

    #[error("Invalid override '{assignment}': {reason}")]
    Override { assignment: String, reason: String },

    #[error("Filelist error: {0}")]
    Filelist(String),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Run store error: {0}")]
    RunStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl HarnessError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn filelist(msg: impl Into<String>) -> Self {
        Self::Filelist(msg.into())
    }

    pub fn launch(msg: impl Into<String>) -> Self {
        Self::Launch(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_override(assignment: &str, reason: impl Into<String>) -> Self {
        Self::Override {
            assignment: assignment.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<Box<figment::Error>> for HarnessError {
    fn from(err: Box<figment::Error>) -> Self {
        Self::Config(err.to_string())
    }
}
