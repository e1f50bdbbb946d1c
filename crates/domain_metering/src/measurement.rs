//! Usage measurements

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use core_kernel::{ProjectId, ResourceId};
use crate::metric::MetricDescriptor;

/// Nanoseconds since the Unix epoch, as carried by the line protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from epoch nanoseconds
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns the epoch nanoseconds
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Converts to a calendar time
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

/// One usage datum for one metric of one project
///
/// Created by the parser, consumed exactly once by a billing worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub project: ProjectId,
    pub resource: Option<ResourceId>,
    pub metric: Arc<MetricDescriptor>,
    pub value: Decimal,
    pub timestamp: Timestamp,
}

impl Measurement {
    /// Returns the line-protocol name of the metric
    pub fn metric_name(&self) -> &str {
        self.metric.name()
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[project={}",
            self.metric.name(),
            self.project
        )?;
        if let Some(resource) = &self.resource {
            write!(f, ",resource={}", resource)?;
        }
        write!(f, " value={} at {}]", self.value, self.timestamp.as_nanos())
    }
}
