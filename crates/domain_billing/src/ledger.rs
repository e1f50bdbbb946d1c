//! Group ledger state
//!
//! The authoritative copy of a project's ledger lives in the external
//! attribute store. This module only models the value that is fetched,
//! mutated in-process for the duration of one transaction and written back
//! conditionally.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use core_kernel::{Credits, CreditsError, ProjectId};
use domain_metering::Timestamp;
use crate::notification::Threshold;

/// Opaque version token handed out by the attribute store
///
/// Only the store interprets it; the pipeline merely echoes it back as the
/// expected version of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerVersion(String);

impl LedgerVersion {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last value and timestamp billed for one metric of one project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCursor {
    pub last_value: Decimal,
    pub last_timestamp: Timestamp,
}

/// One project's billing record
///
/// # Invariants
///
/// - `credits_used` only ever grows through billing
/// - a cursor only ever moves forward in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLedgerState {
    pub project: ProjectId,
    pub credits_granted: Credits,
    pub credits_used: Credits,
    /// Cursors keyed by metric name
    #[serde(default)]
    pub cursors: BTreeMap<String, MetricCursor>,
    /// The threshold the project was last notified about
    #[serde(default)]
    pub last_notified_threshold: Option<Threshold>,
}

impl GroupLedgerState {
    /// Creates a ledger for a project that has never been billed
    pub fn new(project: ProjectId, credits_granted: Credits) -> Self {
        Self {
            project,
            credits_granted,
            credits_used: Credits::zero(),
            cursors: BTreeMap::new(),
            last_notified_threshold: None,
        }
    }

    /// Credits still available, `granted - used`
    pub fn credits_left(&self) -> Result<Credits, CreditsError> {
        self.credits_granted.checked_sub(self.credits_used)
    }

    /// Returns the cursor of a metric, if it was ever billed
    pub fn cursor(&self, metric: &str) -> Option<&MetricCursor> {
        self.cursors.get(metric)
    }

    /// Returns true if any metric has been billed before
    pub fn has_been_billed(&self) -> bool {
        !self.cursors.is_empty()
    }
}

/// A ledger together with the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedLedger {
    pub state: GroupLedgerState,
    pub version: LedgerVersion,
}
