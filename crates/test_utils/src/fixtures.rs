//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for common entities across the credits
//! pipeline. These fixtures are designed to be consistent and predictable.

use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::{CreditRate, Credits, ProjectId};
use domain_metering::{MetricDescriptor, MetricRegistry, ResetPolicy};

/// Fixture for project identifiers
pub struct ProjectFixtures;

impl ProjectFixtures {
    /// The project used by the reference scenario
    pub fn demo() -> ProjectId {
        ProjectId::new("demo").expect("valid project id")
    }

    /// A second, unrelated project
    pub fn other() -> ProjectId {
        ProjectId::new("other").expect("valid project id")
    }

    /// Creates `count` distinct projects named `project-0`, `project-1`, ...
    pub fn many(count: usize) -> Vec<ProjectId> {
        (0..count)
            .map(|i| ProjectId::new(format!("project-{}", i)).expect("valid project id"))
            .collect()
    }
}

/// Fixture for credit amounts
pub struct CreditFixtures;

impl CreditFixtures {
    /// A grant large enough that no test runs out
    pub fn generous_grant() -> Credits {
        Credits::new(dec!(1000000))
    }

    /// The grant used by notification scenarios
    pub fn hundred() -> Credits {
        Credits::new(dec!(100))
    }
}

/// Fixture for metric descriptors and registries
pub struct MetricFixtures;

impl MetricFixtures {
    /// `vcpu` counter of seconds at 0.001 credits each
    pub fn vcpu_seconds() -> MetricDescriptor {
        MetricDescriptor::cumulative("vcpu", "cpu", Self::rate("0.001"))
    }

    /// `vcpu` counter that rebaselines on reset
    pub fn vcpu_seconds_rebaseline() -> MetricDescriptor {
        Self::vcpu_seconds().with_reset_policy(ResetPolicy::Rebaseline)
    }

    /// `ram` counter of MiB-hours at 0.3 credits per GiB-hour
    pub fn ram_mib_hours() -> MetricDescriptor {
        MetricDescriptor::cumulative("ram", "memory", Self::rate("0.0029296875"))
    }

    /// Instantaneous metric at one credit per unit
    pub fn instantaneous(name: &str) -> MetricDescriptor {
        MetricDescriptor::instantaneous(name, format!("{}-friendly", name), Self::rate("1"))
    }

    /// Registry with `vcpu` and `ram`
    pub fn registry() -> Arc<MetricRegistry> {
        let mut registry = MetricRegistry::new();
        registry
            .register(Self::vcpu_seconds())
            .expect("distinct metric");
        registry
            .register(Self::ram_mib_hours())
            .expect("distinct metric");
        Arc::new(registry)
    }

    /// Registry with `count` instantaneous metrics `m0`, `m1`, ...
    pub fn instantaneous_registry(count: usize) -> Arc<MetricRegistry> {
        let mut registry = MetricRegistry::new();
        for i in 0..count {
            registry
                .register(Self::instantaneous(&format!("m{}", i)))
                .expect("distinct metric");
        }
        Arc::new(registry)
    }

    fn rate(value: &str) -> CreditRate {
        CreditRate::new(value.parse().expect("decimal literal")).expect("positive rate")
    }
}

/// Fixture for line-protocol records
pub struct LineFixtures;

impl LineFixtures {
    /// 2020-01-01T00:00:00Z in nanoseconds
    pub const EPOCH_2020: i64 = 1_577_836_800_000_000_000;

    /// One hour in nanoseconds
    pub const HOUR: i64 = 3_600_000_000_000;

    /// First record of the reference scenario
    pub fn baseline() -> &'static str {
        "vcpu,project=demo value=3600 1577836800000000000"
    }

    /// Second record of the reference scenario, one hour later
    pub fn one_hour_later() -> &'static str {
        "vcpu,project=demo value=7200 1577840400000000000"
    }

    /// Formats a record
    pub fn line(metric: &str, project: &ProjectId, value: u64, timestamp: i64) -> String {
        format!("{},project={} value={} {}", metric, project, value, timestamp)
    }
}
