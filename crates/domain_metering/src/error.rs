//! Metering domain errors

use core_kernel::CreditsError;
use thiserror::Error;

/// Errors that can occur in the metering domain
#[derive(Debug, Error)]
pub enum MeteringError {
    /// The record does not follow the line protocol
    #[error("Parse error: {reason} in line `{line}`")]
    Parse { line: String, reason: String },

    /// The record names a metric nobody registered
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// A metric with this name or friendly name is already registered
    #[error("Metric already registered: {0}")]
    DuplicateMetric(String),

    /// Credit arithmetic failed
    #[error("Credits error: {0}")]
    Credits(#[from] CreditsError),
}

impl MeteringError {
    /// Creates a parse error for the given line
    pub fn parse(line: &str, reason: impl Into<String>) -> Self {
        MeteringError::Parse {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true if the record itself was rejected, i.e. it should be
    /// dropped rather than retried
    pub fn is_rejected_input(&self) -> bool {
        matches!(self, MeteringError::Parse { .. } | MeteringError::UnknownMetric(_))
    }
}
