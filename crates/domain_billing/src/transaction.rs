//! Billing transactions
//!
//! Combines the credit calculation and the notification marker into the one
//! ledger mutation a worker hands to the sync client. Everything written in
//! a single conditional write is decided here, from one fetched ledger.

use core_kernel::Credits;
use domain_metering::Measurement;
use crate::calculator::{Calculation, CreditCalculator, SkipReason, UpdateKind};
use crate::error::BillingError;
use crate::ledger::GroupLedgerState;
use crate::notification::{NotificationPolicy, ThresholdCrossing};
use crate::sync::Mutation;

/// Summary of a planned ledger update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingReceipt {
    pub kind: UpdateKind,
    pub delta: Credits,
    pub credits_left: Credits,
    /// Crossing to notify about once the write committed
    pub crossing: Option<ThresholdCrossing>,
}

/// Plans ledger mutations for measurements
#[derive(Debug, Clone, Default)]
pub struct BillingTransaction {
    calculator: CreditCalculator,
    policy: NotificationPolicy,
}

impl BillingTransaction {
    pub fn new(calculator: CreditCalculator, policy: NotificationPolicy) -> Self {
        Self { calculator, policy }
    }

    pub fn calculator(&self) -> &CreditCalculator {
        &self.calculator
    }

    pub fn policy(&self) -> &NotificationPolicy {
        &self.policy
    }

    /// Decides what to write for `measurement` given the fetched ledger
    pub fn plan(
        &self,
        measurement: &Measurement,
        state: &GroupLedgerState,
    ) -> Result<Mutation<SkipReason, BillingReceipt>, BillingError> {
        match self.calculator.calculate(measurement, state)? {
            Calculation::Skip(reason) => Ok(Mutation::Skip(reason)),
            Calculation::Update {
                kind,
                delta,
                state: mut next,
            } => {
                let crossing = self.policy.evaluate(state, &mut next)?;
                let receipt = BillingReceipt {
                    kind,
                    delta,
                    credits_left: next.credits_left()?,
                    crossing,
                };
                Ok(Mutation::Write(next, receipt))
            }
        }
    }
}
