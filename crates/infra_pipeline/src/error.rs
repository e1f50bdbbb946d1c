//! Pipeline error types

use thiserror::Error;

use domain_metering::MeteringError;

/// Errors that can occur when feeding the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The record was rejected by the parser
    #[error("Rejected measurement: {0}")]
    Rejected(#[from] MeteringError),

    /// Shutdown has begun, nothing is accepted any more
    #[error("Task queue is closed")]
    QueueClosed,

    /// The configuration cannot be used
    #[error("Configuration error: {0}")]
    Configuration(String),
}
