//! Metering Domain - From raw usage lines to typed measurements
//!
//! Usage exporters push one line per measurement in InfluxDB line protocol:
//!
//! ```text
//! project_vcpu_usage,project=demo,resource=42 value=7200 1577840400000000000
//! └── metric name ──┘└──── tags ────────────┘ └ field ┘ └─ ns timestamp ──┘
//! ```
//!
//! The metric name selects a [`MetricDescriptor`] from the [`MetricRegistry`],
//! which carries the billing rule: how many credits one unit costs and
//! whether the reported value is a cumulative counter or a standalone sample.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use domain_metering::{LineParser, MetricRegistry};
//!
//! let parser = LineParser::new(Arc::new(MetricRegistry::with_defaults()));
//! let measurement = parser
//!     .parse("project_vcpu_usage,project=demo value=3600 1577836800000000000")
//!     .unwrap();
//! assert_eq!(measurement.project.as_str(), "demo");
//! ```

pub mod metric;
pub mod measurement;
pub mod parser;
pub mod error;

pub use metric::{MetricDescriptor, MetricRegistry, AggregationKind, ResetPolicy};
pub use measurement::{Measurement, Timestamp};
pub use parser::LineParser;
pub use error::MeteringError;
