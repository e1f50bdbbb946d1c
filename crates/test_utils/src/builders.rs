//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use core_kernel::{Credits, ProjectId, ResourceId};
use domain_billing::{GroupLedgerState, InMemoryAttributeStore, MetricCursor, Threshold};
use domain_metering::{Measurement, MetricDescriptor, Timestamp};

use crate::fixtures::{CreditFixtures, LineFixtures, MetricFixtures, ProjectFixtures};

/// Builder for constructing test measurements
pub struct TestMeasurementBuilder {
    project: ProjectId,
    resource: Option<ResourceId>,
    metric: Arc<MetricDescriptor>,
    value: Decimal,
    timestamp: Timestamp,
}

impl Default for TestMeasurementBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestMeasurementBuilder {
    /// Creates a new builder: `vcpu` of project `demo`, value 0, at 2020-01-01
    pub fn new() -> Self {
        Self {
            project: ProjectFixtures::demo(),
            resource: None,
            metric: Arc::new(MetricFixtures::vcpu_seconds()),
            value: Decimal::ZERO,
            timestamp: Timestamp::from_nanos(LineFixtures::EPOCH_2020),
        }
    }

    /// Sets the project
    pub fn with_project(mut self, project: ProjectId) -> Self {
        self.project = project;
        self
    }

    /// Sets the resource tag
    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resource = Some(ResourceId::new(resource).expect("valid resource id"));
        self
    }

    /// Sets the metric
    pub fn with_metric(mut self, metric: MetricDescriptor) -> Self {
        self.metric = Arc::new(metric);
        self
    }

    /// Sets the raw value
    pub fn with_value(mut self, value: Decimal) -> Self {
        self.value = value;
        self
    }

    /// Sets the timestamp in nanoseconds
    pub fn at(mut self, nanos: i64) -> Self {
        self.timestamp = Timestamp::from_nanos(nanos);
        self
    }

    /// Sets the timestamp to `hours` after 2020-01-01
    pub fn hours_after_epoch(self, hours: i64) -> Self {
        self.at(LineFixtures::EPOCH_2020 + hours * LineFixtures::HOUR)
    }

    /// Builds the measurement
    pub fn build(self) -> Measurement {
        Measurement {
            project: self.project,
            resource: self.resource,
            metric: self.metric,
            value: self.value,
            timestamp: self.timestamp,
        }
    }
}

/// Builder for constructing test ledgers
pub struct TestLedgerBuilder {
    state: GroupLedgerState,
}

impl Default for TestLedgerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLedgerBuilder {
    /// Creates a ledger for `demo` with a generous grant and nothing used
    pub fn new() -> Self {
        Self {
            state: GroupLedgerState::new(ProjectFixtures::demo(), CreditFixtures::generous_grant()),
        }
    }

    /// Sets the project
    pub fn for_project(mut self, project: ProjectId) -> Self {
        self.state.project = project;
        self
    }

    /// Sets the granted credits
    pub fn granted(mut self, credits: Decimal) -> Self {
        self.state.credits_granted = Credits::new(credits);
        self
    }

    /// Sets the used credits
    pub fn used(mut self, credits: Decimal) -> Self {
        self.state.credits_used = Credits::new(credits);
        self
    }

    /// Sets a metric cursor
    pub fn with_cursor(mut self, metric: &str, last_value: Decimal, last_timestamp: i64) -> Self {
        self.state.cursors.insert(
            metric.to_string(),
            MetricCursor {
                last_value,
                last_timestamp: Timestamp::from_nanos(last_timestamp),
            },
        );
        self
    }

    /// Sets the notification marker
    pub fn notified_at(mut self, threshold: Threshold) -> Self {
        self.state.last_notified_threshold = Some(threshold);
        self
    }

    /// Builds the ledger
    pub fn build(self) -> GroupLedgerState {
        self.state
    }
}

/// Builder for in-memory attribute stores pre-populated with ledgers
#[derive(Default)]
pub struct TestStoreBuilder {
    ledgers: Vec<GroupLedgerState>,
    default_grant: Option<Credits>,
    latency: Option<Duration>,
}

impl TestStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a ledger
    pub fn with_ledger(mut self, ledger: GroupLedgerState) -> Self {
        self.ledgers.push(ledger);
        self
    }

    /// Adds fresh ledgers with `granted` credits for each project
    pub fn with_projects(mut self, projects: &[ProjectId], granted: Credits) -> Self {
        self.ledgers.extend(
            projects
                .iter()
                .map(|p| GroupLedgerState::new(p.clone(), granted)),
        );
        self
    }

    /// Opens unknown projects with `granted` credits
    pub fn with_default_grant(mut self, granted: Credits) -> Self {
        self.default_grant = Some(granted);
        self
    }

    /// Delays every store call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Builds the store
    pub async fn build(self) -> Arc<InMemoryAttributeStore> {
        let mut store = match self.default_grant {
            Some(granted) => InMemoryAttributeStore::with_default_grant(granted),
            None => InMemoryAttributeStore::new(),
        };
        if let Some(latency) = self.latency {
            store = store.with_latency(latency);
        }
        for ledger in self.ledgers {
            store.insert(ledger).await;
        }
        Arc::new(store)
    }
}
