//! Billing Pipeline Infrastructure
//!
//! This crate runs the billing domain concurrently: measurements are parsed
//! at ingestion, queued, and billed by a fixed pool of tokio workers.
//!
//! # Concurrency Model
//!
//! - one unbounded FIFO queue shared by all workers
//! - one lock per project, so at most one ledger transaction per project is
//!   in flight in this process; different projects proceed in parallel
//! - optimistic conditional writes against the attribute store protect the
//!   ledger from writers in other processes
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_pipeline::{Pipeline, PipelineConfig, PipelinePorts};
//!
//! let pipeline = Pipeline::start(PipelineConfig::new(), registry, ports)?;
//! pipeline.submit_line("project_vcpu_usage,project=demo value=3600 1577836800000000000")?;
//! let report = pipeline.shutdown().await;
//! ```

pub mod config;
pub mod error;
pub mod queue;
pub mod locks;
pub mod stats;
pub mod worker;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use queue::TaskQueue;
pub use locks::{LockTable, ProjectLockGuard};
pub use stats::{CounterSnapshot, PipelineCounters, PipelineStats, StatsSnapshot};
pub use worker::{spawn_workers, BillingProcessor, BillingTask, TaskOutcome};
pub use pipeline::{BatchReport, Pipeline, PipelinePorts, ShutdownReport, Submission};
