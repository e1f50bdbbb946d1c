//! Credit calculation
//!
//! Pure function from (measurement, ledger) to the ledger that should be
//! written, if any. Nothing here touches the store; the sync client calls
//! the calculator again on fresh state whenever a write loses a race.
//!
//! # Rules
//!
//! For a cumulative counter the billed quantity is the difference to the
//! cursor. The first sample of a metric only sets the cursor. A value lower
//! than the cursor is a counter reset and handled by the metric's
//! [`ResetPolicy`]. An instantaneous metric bills every sample in full.
//!
//! Every delta is quantised to the configured precision with banker's
//! rounding before it is added, so `credits_used` is always representable
//! at that precision. A regular delta that rounds to zero leaves the ledger
//! untouched, cursor included, so the usage is billed once it adds up. A
//! counter reset always moves the cursor, whatever it bills.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use core_kernel::{CreditPrecision, Credits};
use domain_metering::{AggregationKind, Measurement, ResetPolicy, Timestamp};
use crate::error::BillingError;
use crate::ledger::{GroupLedgerState, MetricCursor};

/// Why a measurement changes nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The measurement is not newer than the cursor
    Stale { last_timestamp: Timestamp },
    /// The delta rounds to zero at the configured precision
    BelowPrecision,
}

/// What kind of ledger update a measurement produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// First sample of a cumulative metric, cursor set, nothing billed
    Baseline,
    /// Regular billing
    Billed,
    /// Counter went backwards and was billed from zero
    CounterReset,
    /// Counter went backwards, cursor moved, nothing billed
    Rebaselined,
}

/// Result of applying one measurement to a ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Calculation {
    /// Nothing to write
    Skip(SkipReason),
    /// The ledger to write and the credits billed by it
    Update {
        kind: UpdateKind,
        delta: Credits,
        state: GroupLedgerState,
    },
}

impl Calculation {
    /// Credits billed, zero when nothing is billed
    pub fn delta(&self) -> Credits {
        match self {
            Calculation::Update { delta, .. } => *delta,
            Calculation::Skip(_) => Credits::zero(),
        }
    }
}

/// Applies measurements to ledgers
#[derive(Debug, Clone, Copy, Default)]
pub struct CreditCalculator {
    precision: CreditPrecision,
}

impl CreditCalculator {
    pub fn new(precision: CreditPrecision) -> Self {
        Self { precision }
    }

    pub fn precision(&self) -> CreditPrecision {
        self.precision
    }

    /// Computes the ledger update for one measurement
    ///
    /// # Errors
    ///
    /// - `ProjectMismatch` if the ledger belongs to another project
    /// - `Credits` if the arithmetic overflows
    pub fn calculate(
        &self,
        measurement: &Measurement,
        state: &GroupLedgerState,
    ) -> Result<Calculation, BillingError> {
        if measurement.project != state.project {
            return Err(BillingError::ProjectMismatch {
                measurement: measurement.project.clone(),
                ledger: state.project.clone(),
            });
        }

        let metric = measurement.metric_name();
        let cursor = state.cursor(metric).copied();

        if let Some(cursor) = cursor {
            if measurement.timestamp <= cursor.last_timestamp {
                debug!(
                    project = %measurement.project,
                    metric,
                    timestamp = measurement.timestamp.as_nanos(),
                    last_timestamp = cursor.last_timestamp.as_nanos(),
                    "Skipping stale measurement"
                );
                return Ok(Calculation::Skip(SkipReason::Stale {
                    last_timestamp: cursor.last_timestamp,
                }));
            }
        }

        let (kind, quantity) = match (measurement.metric.aggregation(), cursor) {
            (AggregationKind::Instantaneous, _) => (UpdateKind::Billed, measurement.value),
            (AggregationKind::CumulativeCounter, None) => (UpdateKind::Baseline, Decimal::ZERO),
            (AggregationKind::CumulativeCounter, Some(cursor)) => {
                if measurement.value >= cursor.last_value {
                    (UpdateKind::Billed, measurement.value - cursor.last_value)
                } else {
                    warn!(
                        project = %measurement.project,
                        metric,
                        last_value = %cursor.last_value,
                        value = %measurement.value,
                        policy = ?measurement.metric.reset_policy(),
                        "Counter went backwards"
                    );
                    match measurement.metric.reset_policy() {
                        ResetPolicy::RestartFromZero => (UpdateKind::CounterReset, measurement.value),
                        ResetPolicy::Rebaseline => (UpdateKind::Rebaselined, Decimal::ZERO),
                    }
                }
            }
        };

        let delta = measurement
            .metric
            .rate()
            .apply(quantity)?
            .quantize(self.precision);

        let always_moves_cursor = matches!(
            kind,
            UpdateKind::Baseline | UpdateKind::Rebaselined | UpdateKind::CounterReset
        );
        if delta.is_zero() && !always_moves_cursor {
            debug!(
                project = %measurement.project,
                metric,
                quantity = %quantity,
                "Usage below credit precision, keeping cursor"
            );
            return Ok(Calculation::Skip(SkipReason::BelowPrecision));
        }

        let mut next = state.clone();
        next.credits_used = next.credits_used.checked_add(delta)?;
        next.cursors.insert(
            metric.to_string(),
            MetricCursor {
                last_value: measurement.value,
                last_timestamp: measurement.timestamp,
            },
        );

        Ok(Calculation::Update {
            kind,
            delta,
            state: next,
        })
    }
}
