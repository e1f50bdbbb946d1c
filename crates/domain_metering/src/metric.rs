//! Metric descriptors and the registry that resolves them
//!
//! Every billable metric is described by data, not by a type: a name as it
//! appears in the line protocol, a human readable friendly name, a rate and
//! the aggregation rules. The registry is populated once at process start
//! and shared read-only afterwards.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use core_kernel::{CreditPrecision, CreditRate, Credits};
use crate::error::MeteringError;

/// How the raw value of a metric relates to usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    /// The value is a running total; usage is the difference to the last sample
    CumulativeCounter,
    /// The value is the usage itself; every sample is billed on its own
    Instantaneous,
}

/// What a cumulative metric does when its value goes backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// The counter restarted from zero; bill the whole new value
    #[default]
    RestartFromZero,
    /// Bill nothing and continue counting from the new value
    Rebaseline,
}

/// A billing rule for one metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    name: String,
    friendly_name: String,
    description: String,
    rate: CreditRate,
    aggregation: AggregationKind,
    reset_policy: ResetPolicy,
}

impl MetricDescriptor {
    /// Creates a descriptor for a running-total metric
    pub fn cumulative(
        name: impl Into<String>,
        friendly_name: impl Into<String>,
        rate: CreditRate,
    ) -> Self {
        Self::new(name, friendly_name, rate, AggregationKind::CumulativeCounter)
    }

    /// Creates a descriptor for a metric whose samples are billed individually
    pub fn instantaneous(
        name: impl Into<String>,
        friendly_name: impl Into<String>,
        rate: CreditRate,
    ) -> Self {
        Self::new(name, friendly_name, rate, AggregationKind::Instantaneous)
    }

    fn new(
        name: impl Into<String>,
        friendly_name: impl Into<String>,
        rate: CreditRate,
        aggregation: AggregationKind,
    ) -> Self {
        Self {
            name: name.into(),
            friendly_name: friendly_name.into(),
            description: String::new(),
            rate,
            aggregation,
            reset_policy: ResetPolicy::default(),
        }
    }

    /// Sets the description shown by the metrics listing
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the reset policy
    pub fn with_reset_policy(mut self, reset_policy: ResetPolicy) -> Self {
        self.reset_policy = reset_policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn rate(&self) -> CreditRate {
        self.rate
    }

    pub fn aggregation(&self) -> AggregationKind {
        self.aggregation
    }

    pub fn reset_policy(&self) -> ResetPolicy {
        self.reset_policy
    }

    /// Credits one hour of `spec` units costs, e.g. 4 vCPUs for an hour
    ///
    /// Only meaningful for metrics whose unit is "unit-hours".
    pub fn costs_per_hour(
        &self,
        spec: Decimal,
        precision: CreditPrecision,
    ) -> Result<Credits, MeteringError> {
        Ok(self.rate.apply(spec)?.quantize(precision))
    }
}

/// Maps metric names to their billing rules
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    metrics: HashMap<String, Arc<MetricDescriptor>>,
    friendly_names: HashMap<String, String>,
}

impl MetricRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the standard cloud metrics
    ///
    /// - `project_vcpu_usage` (`cpu`): vCPU-hours, one credit each
    /// - `project_mb_usage` (`ram`): MiB-hours, 0.3 credits per GiB-hour
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for descriptor in Self::standard_metrics() {
            // names are distinct, registration cannot collide
            let _ = registry.register(descriptor);
        }
        registry
    }

    fn standard_metrics() -> Vec<MetricDescriptor> {
        let mut metrics = Vec::new();
        if let Ok(rate) = CreditRate::new(dec!(1)) {
            metrics.push(
                MetricDescriptor::cumulative("project_vcpu_usage", "cpu", rate)
                    .with_description("Amount of vCPUs."),
            );
        }
        if let Ok(rate) = CreditRate::new(dec!(0.3) / dec!(1024)) {
            metrics.push(
                MetricDescriptor::cumulative("project_mb_usage", "ram", rate).with_description(
                    "Amount of RAM in MiB, meaning *1024 instead of *1000, the unit \
                     OpenStack reports in its os-simple-tenant-usage api.",
                ),
            );
        }
        metrics
    }

    /// Registers a metric
    ///
    /// # Errors
    ///
    /// Returns `DuplicateMetric` if the name or the friendly name is taken
    pub fn register(&mut self, descriptor: MetricDescriptor) -> Result<(), MeteringError> {
        if self.metrics.contains_key(descriptor.name()) {
            return Err(MeteringError::DuplicateMetric(descriptor.name().to_string()));
        }
        if self.friendly_names.contains_key(descriptor.friendly_name()) {
            return Err(MeteringError::DuplicateMetric(
                descriptor.friendly_name().to_string(),
            ));
        }

        debug!(
            metric = descriptor.name(),
            friendly_name = descriptor.friendly_name(),
            rate = %descriptor.rate(),
            "Registered metric"
        );
        self.friendly_names.insert(
            descriptor.friendly_name().to_string(),
            descriptor.name().to_string(),
        );
        self.metrics
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// Looks up a metric by its line-protocol name
    pub fn get(&self, name: &str) -> Option<&Arc<MetricDescriptor>> {
        self.metrics.get(name)
    }

    /// Looks up a metric, failing with `UnknownMetric`
    pub fn resolve(&self, name: &str) -> Result<Arc<MetricDescriptor>, MeteringError> {
        self.get(name)
            .cloned()
            .ok_or_else(|| MeteringError::UnknownMetric(name.to_string()))
    }

    /// Looks up a metric by its friendly name
    pub fn by_friendly_name(&self, friendly_name: &str) -> Option<&Arc<MetricDescriptor>> {
        self.friendly_names
            .get(friendly_name)
            .and_then(|name| self.metrics.get(name))
    }

    /// Returns all descriptors ordered by name
    pub fn descriptors(&self) -> Vec<Arc<MetricDescriptor>> {
        let ordered: BTreeMap<_, _> = self.metrics.iter().collect();
        ordered.into_values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Estimates the hourly cost of a machine specification
    ///
    /// `specs` maps friendly names to amounts, e.g. `{"cpu": 4, "ram": 8192}`.
    /// Each metric is quantised individually before summing, so the estimate
    /// matches what the billing of each metric would produce.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMetric` for any friendly name not registered
    pub fn costs_per_hour(
        &self,
        specs: &HashMap<String, Decimal>,
        precision: CreditPrecision,
    ) -> Result<Credits, MeteringError> {
        let mut total = Credits::zero();
        for (friendly_name, spec) in specs {
            let descriptor = self
                .by_friendly_name(friendly_name)
                .ok_or_else(|| MeteringError::UnknownMetric(friendly_name.clone()))?;
            total = total.checked_add(descriptor.costs_per_hour(*spec, precision)?)?;
        }
        Ok(total)
    }
}
