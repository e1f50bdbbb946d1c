//! Billing domain errors

use thiserror::Error;

use core_kernel::{CreditsError, PortError, ProjectId};

/// Errors that can occur while computing a billing step
#[derive(Debug, Error)]
pub enum BillingError {
    /// Credit arithmetic failed
    #[error("Credits error: {0}")]
    Credits(#[from] CreditsError),

    /// The measurement belongs to a different project than the ledger
    #[error("Measurement for project {measurement} applied to ledger of {ledger}")]
    ProjectMismatch {
        measurement: ProjectId,
        ledger: ProjectId,
    },
}

/// Errors surfaced by a synchronised ledger transaction
#[derive(Debug, Error)]
pub enum SyncError {
    /// Every conditional write lost against a concurrent writer
    #[error("Ledger of {project} still conflicting after {attempts} attempts")]
    ConcurrencyExhausted { project: ProjectId, attempts: u32 },

    /// The attribute store stayed unreachable for the whole retry budget
    #[error("Attribute store unavailable for {project} after {attempts} attempts: {source}")]
    StoreUnavailable {
        project: ProjectId,
        attempts: u32,
        #[source]
        source: PortError,
    },

    /// The store has no ledger for the project
    #[error("Project not found in attribute store: {0}")]
    ProjectNotFound(ProjectId),

    /// Backoff was cut short by shutdown
    #[error("Ledger transaction for {0} aborted by shutdown")]
    Aborted(ProjectId),

    /// The store failed in a way retrying cannot fix
    #[error("Attribute store error for {project}: {source}")]
    Store {
        project: ProjectId,
        #[source]
        source: PortError,
    },

    /// Computing the new ledger state failed
    #[error(transparent)]
    Billing(#[from] BillingError),
}
