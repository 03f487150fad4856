//! Error types for mentalnav-metrics
//!
//! Only whole-dataset failures are errors. Per-trial anomalies are absorbed by
//! the pipeline and reported through [`crate::types::ExclusionCounts`].

use thiserror::Error;

/// Errors that can occur while loading, analyzing or exporting a participant
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to fetch data for participant {participant}: {reason}")]
    SourceFetchFailure { participant: String, reason: String },

    #[error("Failed to parse participant document: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Export error: {0}")]
    ExportError(String),
}

impl PipelineError {
    pub(crate) fn fetch(participant: &str, reason: impl std::fmt::Display) -> Self {
        PipelineError::SourceFetchFailure {
            participant: participant.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for PipelineError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        PipelineError::ExportError(e.to_string())
    }
}
