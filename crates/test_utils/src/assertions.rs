//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for credits and ledgers that give
//! more meaningful error messages than standard assertions.

use rust_decimal::Decimal;

use core_kernel::{CreditPrecision, Credits};
use domain_billing::GroupLedgerState;

/// Asserts that a credit amount equals the expected decimal
pub fn assert_credits_eq(actual: Credits, expected: Decimal) {
    assert_eq!(
        actual.amount(),
        expected,
        "Credits differ: actual={}, expected={}",
        actual,
        expected
    );
}

/// Asserts that a ledger has used exactly `expected` credits
pub fn assert_used(ledger: &GroupLedgerState, expected: Decimal) {
    assert_eq!(
        ledger.credits_used.amount(),
        expected,
        "Ledger of {} used {} credits, expected {}",
        ledger.project,
        ledger.credits_used,
        expected
    );
}

/// Asserts that a ledger's cursor for `metric` holds `value`
pub fn assert_cursor_value(ledger: &GroupLedgerState, metric: &str, value: Decimal) {
    let cursor = ledger
        .cursor(metric)
        .unwrap_or_else(|| panic!("Ledger of {} has no cursor for {}", ledger.project, metric));
    assert_eq!(
        cursor.last_value, value,
        "Cursor of {} for {} is at {}, expected {}",
        ledger.project, metric, cursor.last_value, value
    );
}

/// Asserts that a credit amount has no more decimal places than `precision`
pub fn assert_quantized(credits: Credits, precision: CreditPrecision) {
    assert_eq!(
        credits.quantize(precision),
        credits,
        "Credits {} not representable at {} decimal places",
        credits,
        precision.decimal_places()
    );
}
