//! Billing history
//!
//! Every billed delta is appended to a history log after its ledger write
//! committed. The log is keyed by (project, timestamp, metric); replaying a
//! measurement can therefore never produce a second entry.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use core_kernel::{Credits, ProjectId};
use domain_metering::{Measurement, Timestamp};
use crate::ports::{AppendOutcome, HistoryStore};

/// Identity of a history entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HistoryKey {
    pub project: ProjectId,
    pub timestamp: Timestamp,
    pub metric: String,
}

/// One billed delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingHistoryEntry {
    pub project: ProjectId,
    pub timestamp: Timestamp,
    pub metric: String,
    pub metric_friendly_name: String,
    /// Credits billed by this measurement
    pub delta: Credits,
    /// Credits left after the billing
    pub credits_left: Credits,
}

impl BillingHistoryEntry {
    /// Creates the entry for a billed measurement
    pub fn for_measurement(measurement: &Measurement, delta: Credits, credits_left: Credits) -> Self {
        Self {
            project: measurement.project.clone(),
            timestamp: measurement.timestamp,
            metric: measurement.metric.name().to_string(),
            metric_friendly_name: measurement.metric.friendly_name().to_string(),
            delta,
            credits_left,
        }
    }

    pub fn key(&self) -> HistoryKey {
        HistoryKey {
            project: self.project.clone(),
            timestamp: self.timestamp,
            metric: self.metric.clone(),
        }
    }
}

/// Appends billed deltas to the history store
///
/// The ledger is the source of truth; a failed append is logged and never
/// undoes the billing.
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Records one entry, returning `None` if the store failed
    pub async fn record(&self, entry: &BillingHistoryEntry) -> Option<AppendOutcome> {
        match self.store.append(entry).await {
            Ok(outcome) => {
                if outcome == AppendOutcome::DuplicateIgnored {
                    debug!(
                        project = %entry.project,
                        metric = %entry.metric,
                        timestamp = entry.timestamp.as_nanos(),
                        "History entry already present"
                    );
                }
                Some(outcome)
            }
            Err(e) => {
                warn!(
                    project = %entry.project,
                    metric = %entry.metric,
                    timestamp = entry.timestamp.as_nanos(),
                    delta = %entry.delta,
                    error = %e,
                    "Failed to append billing history"
                );
                None
            }
        }
    }
}
