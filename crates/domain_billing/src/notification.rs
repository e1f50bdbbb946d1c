//! Low-balance notifications
//!
//! A project is told once when its remaining credits fall to or below a
//! threshold. The ledger remembers the last threshold it was told about,
//! and that marker travels in the same conditional write as the billing
//! itself, so two racing workers cannot both notify.
//!
//! When several thresholds are crossed by one billing step only the lowest
//! is reported. When credits climb back above the marked threshold (more
//! credits granted) the marker is cleared and the threshold can fire again.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use core_kernel::{Credits, CreditsError, DomainPort, PortError, ProjectId};
use async_trait::async_trait;
use crate::error::BillingError;
use crate::ledger::GroupLedgerState;

/// A remaining-credits level worth telling the project about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Threshold {
    /// A fixed number of credits left
    Absolute(Credits),
    /// A fraction of the credits granted, e.g. `0.5` for half
    FractionOfGranted(Decimal),
}

impl Threshold {
    /// Returns the credits level this threshold stands for
    pub fn resolve(&self, credits_granted: Credits) -> Result<Credits, CreditsError> {
        match self {
            Threshold::Absolute(credits) => Ok(*credits),
            Threshold::FractionOfGranted(fraction) => credits_granted.checked_mul(*fraction),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Absolute(credits) => write!(f, "{} credits", credits),
            Threshold::FractionOfGranted(fraction) => {
                write!(f, "{}% of granted", (*fraction * dec!(100)).normalize())
            }
        }
    }
}

/// A threshold crossed by a billing step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdCrossing {
    pub project: ProjectId,
    pub threshold: Threshold,
    /// The threshold resolved against the granted credits
    pub threshold_credits: Credits,
    pub credits_granted: Credits,
    pub credits_used: Credits,
    pub credits_left: Credits,
}

/// The thresholds a deployment notifies about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPolicy {
    thresholds: Vec<Threshold>,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            thresholds: vec![Threshold::FractionOfGranted(dec!(0.5))],
        }
    }
}

impl NotificationPolicy {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        Self { thresholds }
    }

    /// A policy that never notifies
    pub fn disabled() -> Self {
        Self { thresholds: Vec::new() }
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    /// Updates the notification marker of `next` and returns the crossing
    /// to report, if any
    ///
    /// `previous` is the ledger as fetched, `next` the ledger about to be
    /// written. Only `next.last_notified_threshold` is modified.
    pub fn evaluate(
        &self,
        previous: &GroupLedgerState,
        next: &mut GroupLedgerState,
    ) -> Result<Option<ThresholdCrossing>, BillingError> {
        let granted = next.credits_granted;
        let left_before = previous.credits_left()?;
        let left_after = next.credits_left()?;

        if let Some(marker) = next.last_notified_threshold {
            if left_after > marker.resolve(granted)? {
                info!(
                    project = %next.project,
                    threshold = %marker,
                    "Credits back above notified threshold, clearing marker"
                );
                next.last_notified_threshold = None;
            }
        }

        let mut lowest: Option<(Threshold, Credits)> = None;
        for threshold in &self.thresholds {
            let level = threshold.resolve(granted)?;
            let crossed = left_before > level && left_after <= level;
            if crossed && lowest.map_or(true, |(_, current)| level < current) {
                lowest = Some((*threshold, level));
            }
        }

        let Some((threshold, threshold_credits)) = lowest else {
            return Ok(None);
        };
        if next.last_notified_threshold == Some(threshold) {
            return Ok(None);
        }

        next.last_notified_threshold = Some(threshold);
        Ok(Some(ThresholdCrossing {
            project: next.project.clone(),
            threshold,
            threshold_credits,
            credits_granted: granted,
            credits_used: next.credits_used,
            credits_left: left_after,
        }))
    }
}

/// Delivers threshold notifications to a project's members
#[async_trait]
pub trait Notifier: DomainPort {
    /// Sends one notification
    async fn notify(&self, crossing: &ThresholdCrossing) -> Result<(), PortError>;
}

/// Sends notifications for committed crossings
///
/// Delivery is best effort: the ledger already carries the marker, so a
/// failed send is logged and not retried.
#[derive(Clone)]
pub struct NotificationTrigger {
    notifier: Arc<dyn Notifier>,
}

impl NotificationTrigger {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Sends the notification, returning whether it was delivered
    pub async fn send(&self, crossing: &ThresholdCrossing) -> bool {
        match self.notifier.notify(crossing).await {
            Ok(()) => {
                info!(
                    project = %crossing.project,
                    threshold = %crossing.threshold,
                    credits_left = %crossing.credits_left,
                    "Sent low credits notification"
                );
                true
            }
            Err(e) => {
                warn!(
                    project = %crossing.project,
                    threshold = %crossing.threshold,
                    error = %e,
                    "Failed to send low credits notification"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(granted: Decimal, used: Decimal) -> GroupLedgerState {
        let mut state = GroupLedgerState::new(ProjectId::new("demo").unwrap(), Credits::new(granted));
        state.credits_used = Credits::new(used);
        state
    }

    fn spend(state: &GroupLedgerState, used: Decimal) -> GroupLedgerState {
        let mut next = state.clone();
        next.credits_used = Credits::new(used);
        next
    }

    #[test]
    fn test_crossing_half_notifies_once() {
        let policy = NotificationPolicy::default();
        let before = ledger(dec!(100), dec!(40));
        let mut after = spend(&before, dec!(55));

        let crossing = policy.evaluate(&before, &mut after).unwrap().unwrap();
        assert_eq!(crossing.threshold_credits.amount(), dec!(50));
        assert_eq!(crossing.credits_left.amount(), dec!(45));
        assert_eq!(after.last_notified_threshold, Some(Threshold::FractionOfGranted(dec!(0.5))));

        let mut further = spend(&after, dec!(60));
        assert!(policy.evaluate(&after, &mut further).unwrap().is_none());
        assert_eq!(further.last_notified_threshold, after.last_notified_threshold);
    }

    #[test]
    fn test_landing_exactly_on_threshold_counts() {
        let policy = NotificationPolicy::default();
        let before = ledger(dec!(100), dec!(49));
        let mut after = spend(&before, dec!(50));
        assert!(policy.evaluate(&before, &mut after).unwrap().is_some());
    }

    #[test]
    fn test_only_lowest_of_several_crossed() {
        let policy = NotificationPolicy::new(vec![
            Threshold::FractionOfGranted(dec!(0.5)),
            Threshold::FractionOfGranted(dec!(0.25)),
            Threshold::Absolute(Credits::new(dec!(5))),
        ]);
        let before = ledger(dec!(100), dec!(10));
        let mut after = spend(&before, dec!(80));

        let crossing = policy.evaluate(&before, &mut after).unwrap().unwrap();
        assert_eq!(crossing.threshold, Threshold::FractionOfGranted(dec!(0.25)));
    }

    #[test]
    fn test_marker_cleared_when_credits_grow() {
        let policy = NotificationPolicy::default();
        let mut before = ledger(dec!(100), dec!(60));
        before.last_notified_threshold = Some(Threshold::FractionOfGranted(dec!(0.5)));

        let mut after = before.clone();
        after.credits_granted = Credits::new(dec!(200));
        assert!(policy.evaluate(&before, &mut after).unwrap().is_none());
        assert!(after.last_notified_threshold.is_none());
    }

    #[test]
    fn test_disabled_policy_never_notifies() {
        let policy = NotificationPolicy::disabled();
        let before = ledger(dec!(100), dec!(0));
        let mut after = spend(&before, dec!(100));
        assert!(policy.evaluate(&before, &mut after).unwrap().is_none());
    }

    #[test]
    fn test_threshold_display() {
        assert_eq!(Threshold::FractionOfGranted(dec!(0.5)).to_string(), "50% of granted");
        assert_eq!(Threshold::Absolute(Credits::new(dec!(10))).to_string(), "10 credits");
    }
}
