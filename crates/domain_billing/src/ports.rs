//! Billing Domain Ports
//!
//! The billing domain depends on two stores it does not own:
//!
//! - **AttributeStore**: holds every project's [`GroupLedgerState`] and
//!   supports conditional writes against a version token
//! - **HistoryStore**: an append-only log of billed deltas, keyed by
//!   (project, timestamp, metric)
//!
//! The notification transport is the third port, [`crate::Notifier`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let store: Arc<dyn AttributeStore> = Arc::new(InMemoryAttributeStore::new());
//! let client = AttributeSyncClient::new(store, RetryPolicy::default());
//! ```

use async_trait::async_trait;

use core_kernel::{DomainPort, PortError, ProjectId};
use crate::history::BillingHistoryEntry;
use crate::ledger::{GroupLedgerState, LedgerVersion, VersionedLedger};

/// Result of a conditional ledger write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied; the ledger now has this version
    Committed(LedgerVersion),
    /// Someone else wrote since the expected version was read
    VersionConflict,
}

/// Storage of project ledgers with optimistic concurrency
///
/// Implementations report an unknown project as `PortError::NotFound` and
/// an unreachable backend as `PortError::Unavailable` or
/// `PortError::Timeout`; the sync client retries only the latter two.
#[async_trait]
pub trait AttributeStore: DomainPort {
    /// Reads a project's ledger and the version it was read at
    async fn fetch(&self, project: &ProjectId) -> Result<VersionedLedger, PortError>;

    /// Writes a project's ledger if its version is still `expected`
    async fn write(
        &self,
        project: &ProjectId,
        state: &GroupLedgerState,
        expected: &LedgerVersion,
    ) -> Result<WriteOutcome, PortError>;
}

/// Result of appending to the billing history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// An entry with the same key already exists and was kept
    DuplicateIgnored,
}

/// Append-only billing history
#[async_trait]
pub trait HistoryStore: DomainPort {
    /// Appends one entry, ignoring it if its key is already present
    async fn append(&self, entry: &BillingHistoryEntry) -> Result<AppendOutcome, PortError>;

    /// Returns a project's entries ordered by timestamp
    async fn entries(&self, project: &ProjectId) -> Result<Vec<BillingHistoryEntry>, PortError>;
}
