//! Error types for the scoring pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type for scoring operations
pub type Result<T> = std::result::Result<T, ScoringError>;

/// Errors raised while loading artifacts or scoring a single application.
///
/// Everything except [`ScoringError::ArtifactLoad`] is local to one request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// Missing required attribute, invalid category sentinel or type mismatch
    #[error("Validation error: {0}")]
    Validation(String),

    /// Classifier or metadata artifact missing or unreadable
    #[error("Failed to load artifact {path}: {reason}")]
    ArtifactLoad { path: PathBuf, reason: String },

    /// The classifier artifact was not loaded at startup
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Non-finite value reached a point where it cannot be served
    #[error("Computation error: {0}")]
    Computation(String),

    /// Two distinct raw column names normalize to the same feature name
    #[error("Schema mismatch: '{first}' and '{second}' both normalize to '{feature}'")]
    SchemaMismatch {
        feature: String,
        first: String,
        second: String,
    },

    /// Classifier or attribution runtime failure
    #[error("Inference error: {0}")]
    Inference(String),
}

impl ScoringError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArtifactLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn inference(reason: impl ToString) -> Self {
        Self::Inference(reason.to_string())
    }
}

impl From<ort::Error> for ScoringError {
    fn from(e: ort::Error) -> Self {
        Self::Inference(e.to_string())
    }
}
