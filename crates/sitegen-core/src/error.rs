// crates/sitegen-core/src/error.rs

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Validation,
    Architect,
    Builder,
    Upload,
    Unknown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Validation => "validation",
            Phase::Architect => "architect",
            Phase::Builder => "builder",
            Phase::Upload => "upload",
            Phase::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generative text service is not configured: {0}")]
    Configuration(String),

    #[error("request to generative text service failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("generative text service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response from generative text service: {0}")]
    InvalidResponse(String),

    #[error("generated markup rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("expected file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("file I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("'{0}' is not a valid path segment")]
    InvalidSegment(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be set")]
    Missing { name: &'static str },

    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Terminal failure of a pipeline run, tagged with the stage that stopped it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{phase} failed: {message}")]
pub struct PipelineError {
    pub phase: Phase,
    pub message: String,
    pub validation_errors: Vec<FieldError>,
}

impl PipelineError {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            validation_errors: Vec::new(),
        }
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        let message = errors
            .iter()
            .map(|error| error.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            phase: Phase::Validation,
            message,
            validation_errors: errors,
        }
    }

    pub fn architect(err: impl fmt::Display) -> Self {
        Self::new(Phase::Architect, err.to_string())
    }

    pub fn builder(err: impl fmt::Display) -> Self {
        Self::new(Phase::Builder, err.to_string())
    }

    pub fn upload(err: impl fmt::Display) -> Self {
        Self::new(Phase::Upload, err.to_string())
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
