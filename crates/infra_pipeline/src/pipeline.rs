//! Pipeline facade
//!
//! Wires parser, queue, lock table and worker pool together and owns the
//! shutdown sequence:
//!
//! 1. close the queue, new submissions fail with `QueueClosed`
//! 2. wait up to the drain timeout for workers to empty the queue
//! 3. on timeout drop what is still queued and count it
//! 4. fire the abort signal so retry backoffs end early
//! 5. wait for every worker to finish its current task

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{info, warn};

use domain_billing::{
    AttributeStore, AttributeSyncClient, BillingTransaction, CreditCalculator, HistoryRecorder,
    HistoryStore, NotificationTrigger, Notifier,
};
use domain_metering::{LineParser, Measurement, MeteringError, MetricRegistry};
use core_kernel::TaskId;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::locks::LockTable;
use crate::queue::TaskQueue;
use crate::stats::{bump, PipelineStats, StatsSnapshot};
use crate::worker::{spawn_workers, BillingProcessor, BillingTask};

/// The external systems a pipeline talks to
#[derive(Clone)]
pub struct PipelinePorts {
    pub attribute_store: Arc<dyn AttributeStore>,
    pub history_store: Arc<dyn HistoryStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// What happened to a submitted measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Queued for billing
    Accepted(TaskId),
    /// The project is not on the whitelist
    Ignored,
}

/// Tally of a multi-line submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub accepted: usize,
    pub rejected: usize,
    pub ignored: usize,
    /// Why each rejected line was rejected
    pub errors: Vec<String>,
}

/// How shutdown went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The queue was not empty when the drain timeout passed
    pub timed_out: bool,
    /// Measurements dropped from the queue
    pub dropped: usize,
}

/// A running billing pipeline
pub struct Pipeline {
    parser: LineParser,
    config: PipelineConfig,
    queue: Arc<TaskQueue<BillingTask>>,
    locks: Arc<LockTable>,
    stats: Arc<PipelineStats>,
    workers: Mutex<Option<JoinSet<()>>>,
    abort: watch::Sender<bool>,
}

impl Pipeline {
    /// Validates the configuration and starts the worker pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: PipelineConfig,
        registry: Arc<MetricRegistry>,
        ports: PipelinePorts,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let queue = Arc::new(TaskQueue::new());
        let locks = Arc::new(LockTable::new(config.evict_idle_locks));
        let stats = Arc::new(PipelineStats::new());
        let (abort, abort_rx) = watch::channel(false);

        let processor = BillingProcessor::new(
            AttributeSyncClient::new(ports.attribute_store, config.retry)
                .with_abort_signal(abort_rx),
            BillingTransaction::new(
                CreditCalculator::new(config.precision),
                config.notification.clone(),
            ),
            HistoryRecorder::new(ports.history_store),
            NotificationTrigger::new(ports.notifier),
            Arc::clone(&locks),
            Arc::clone(&stats),
        );
        let workers = spawn_workers(config.workers, Arc::clone(&queue), processor);

        info!(
            workers = config.workers,
            metrics = registry.len(),
            precision = config.precision.decimal_places(),
            whitelist = config.project_whitelist.as_ref().map(|w| w.len()),
            "Billing pipeline started"
        );

        Ok(Self {
            parser: LineParser::new(registry),
            config,
            queue,
            locks,
            stats,
            workers: Mutex::new(Some(workers)),
            abort,
        })
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        self.parser.registry()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns false once shutdown has begun
    pub fn is_accepting(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Parses one record and queues it
    ///
    /// # Errors
    ///
    /// - `Rejected` if the record does not parse or names an unknown metric
    /// - `QueueClosed` once shutdown has begun
    pub fn submit_line(&self, line: &str) -> Result<Submission, PipelineError> {
        match self.parser.parse(line) {
            Ok(measurement) => self.submit(measurement),
            Err(e) => {
                match &e {
                    MeteringError::UnknownMetric(_) => bump(&self.stats.counters.unknown_metrics),
                    _ => bump(&self.stats.counters.parse_errors),
                }
                warn!(error = %e, "Dropping unparsable measurement");
                Err(PipelineError::Rejected(e))
            }
        }
    }

    /// Queues a parsed measurement
    pub fn submit(&self, measurement: Measurement) -> Result<Submission, PipelineError> {
        if !self.config.is_billed(&measurement.project) {
            bump(&self.stats.counters.whitelist_skipped);
            info!(project = %measurement.project, "Ignoring measurement of project outside whitelist");
            return Ok(Submission::Ignored);
        }

        let task = BillingTask::new(measurement);
        let id = task.id;
        self.queue.enqueue(task)?;
        bump(&self.stats.counters.accepted);
        Ok(Submission::Accepted(id))
    }

    /// Submits every non-blank line of `body`
    ///
    /// # Errors
    ///
    /// Returns `QueueClosed` if shutdown began before or during the batch;
    /// lines already queued stay queued.
    pub fn submit_batch(&self, body: &str) -> Result<BatchReport, PipelineError> {
        let mut report = BatchReport::default();
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            match self.submit_line(line) {
                Ok(Submission::Accepted(_)) => report.accepted += 1,
                Ok(Submission::Ignored) => report.ignored += 1,
                Err(PipelineError::Rejected(e)) => {
                    report.rejected += 1;
                    report.errors.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            workers: self.config.workers,
            queue_size: self.queue.len(),
            locks: self.locks.len(),
            accepting: self.is_accepting(),
            started_at: self.stats.started_at(),
            uptime_secs: self.stats.uptime_secs(),
            counters: self.stats.counters.snapshot(),
        }
    }

    /// Stops the pipeline, waiting at most the configured drain timeout
    /// for queued work
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_with_timeout(self.config.drain_timeout).await
    }

    /// Stops the pipeline with an explicit drain timeout
    ///
    /// Calling it again after the first shutdown returns an empty report.
    pub async fn shutdown_with_timeout(&self, drain_timeout: Duration) -> ShutdownReport {
        self.queue.close();
        let Some(mut workers) = self.workers.lock().await.take() else {
            return ShutdownReport::default();
        };
        info!(
            queued = self.queue.len(),
            drain_timeout_ms = drain_timeout.as_millis() as u64,
            "Shutting down billing pipeline"
        );

        let drained = tokio::time::timeout(drain_timeout, join_all(&mut workers)).await;
        let mut report = ShutdownReport::default();

        if drained.is_err() {
            let remaining = self.queue.drain_remaining();
            report.timed_out = true;
            report.dropped = remaining.len();
            for task in &remaining {
                bump(&self.stats.counters.shutdown_dropped);
                warn!(
                    task_id = %task.id,
                    measurement = %task.measurement,
                    "Dropping queued measurement at shutdown"
                );
            }
            // a closed receiver only means every worker already stopped
            let _ = self.abort.send(true);
            join_all(&mut workers).await;
        }

        info!(
            timed_out = report.timed_out,
            dropped = report.dropped,
            "Billing pipeline stopped"
        );
        report
    }
}

async fn join_all(workers: &mut JoinSet<()>) {
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "Billing worker ended abnormally");
        }
    }
}
