//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::{CreditRate, ProjectId};

/// Strategy for generating valid project identifiers
pub fn project_id_strategy() -> impl Strategy<Value = ProjectId> {
    "[a-z][a-z0-9-]{0,15}".prop_map(|name| ProjectId::new(name).expect("pattern yields valid id"))
}

/// Strategy for rates with at most two decimal places, so that any integer
/// quantity is billed without rounding at the default precision
pub fn exact_rate_strategy() -> impl Strategy<Value = CreditRate> {
    (1i64..100_000i64).prop_map(|cents| CreditRate::new(Decimal::new(cents, 2)).expect("positive rate"))
}

/// Strategy for arbitrary positive rates with up to six decimal places
pub fn rate_strategy() -> impl Strategy<Value = CreditRate> {
    (1i64..10_000_000i64).prop_map(|micros| CreditRate::new(Decimal::new(micros, 6)).expect("positive rate"))
}

/// Strategy for a non-decreasing counter series with strictly increasing
/// timestamps, as `(value, timestamp)` pairs
pub fn counter_series_strategy(max_len: usize) -> impl Strategy<Value = Vec<(u64, i64)>> {
    proptest::collection::vec((0u64..10_000u64, 1i64..1_000_000i64), 1..max_len).prop_map(
        |steps| {
            let mut value = 0u64;
            let mut timestamp = 0i64;
            steps
                .into_iter()
                .map(|(increase, gap)| {
                    value += increase;
                    timestamp += gap;
                    (value, timestamp)
                })
                .collect()
        },
    )
}

/// Strategy for garbage input lines
pub fn garbage_line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,8}",
        "[a-z]{1,8} [a-z]{1,8}",
        "[a-z]{1,8},[a-z]{1,8} value=[0-9]{1,4}",
        "[a-z]{1,8},project=[a-z]{1,8} value=[a-z]{1,4} [0-9]{1,10}",
    ]
}
