//! Billing workers
//!
//! A fixed number of workers pull tasks from the queue. Each task runs end
//! to end in one worker: take the project lock, run the ledger transaction,
//! release the lock, then append history and send notifications for what
//! was committed. Failures are logged and counted; a worker never stops
//! because one task failed.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use core_kernel::{Credits, TaskId};
use domain_billing::{
    AppendOutcome, AttributeSyncClient, BillingHistoryEntry, BillingTransaction,
    HistoryRecorder, NotificationTrigger, SkipReason, SyncError, TransactionOutcome, UpdateKind,
};
use domain_metering::Measurement;
use crate::locks::LockTable;
use crate::queue::TaskQueue;
use crate::stats::{bump, PipelineStats};

/// One queued measurement
#[derive(Debug, Clone)]
pub struct BillingTask {
    pub id: TaskId,
    pub measurement: Measurement,
}

impl BillingTask {
    pub fn new(measurement: Measurement) -> Self {
        Self {
            id: TaskId::new(),
            measurement,
        }
    }
}

/// How a task ended
#[derive(Debug)]
pub enum TaskOutcome {
    /// The ledger was written; `delta` may be zero for a baseline
    Committed { kind: UpdateKind, delta: Credits },
    /// Nothing to write
    Skipped(SkipReason),
    /// The transaction failed and the measurement was dropped
    Failed(SyncError),
}

/// Runs billing tasks
#[derive(Clone)]
pub struct BillingProcessor {
    sync: AttributeSyncClient,
    billing: BillingTransaction,
    history: HistoryRecorder,
    notifications: NotificationTrigger,
    locks: Arc<LockTable>,
    stats: Arc<PipelineStats>,
}

impl BillingProcessor {
    pub fn new(
        sync: AttributeSyncClient,
        billing: BillingTransaction,
        history: HistoryRecorder,
        notifications: NotificationTrigger,
        locks: Arc<LockTable>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            sync,
            billing,
            history,
            notifications,
            locks,
            stats,
        }
    }

    /// Processes one task
    pub async fn process(&self, task: BillingTask) -> TaskOutcome {
        let span = info_span!(
            "billing_task",
            task_id = %task.id,
            project = %task.measurement.project,
            metric = task.measurement.metric_name(),
        );
        self.run(task.measurement).instrument(span).await
    }

    async fn run(&self, measurement: Measurement) -> TaskOutcome {
        let guard = self.locks.acquire(&measurement.project).await;
        let result = self
            .sync
            .transact(&measurement.project, |ledger| {
                self.billing.plan(&measurement, ledger)
            })
            .await;
        drop(guard);

        let counters = &self.stats.counters;
        match result {
            Ok(TransactionOutcome::Skipped(reason)) => {
                match reason {
                    SkipReason::Stale { .. } => bump(&counters.stale),
                    SkipReason::BelowPrecision => bump(&counters.below_precision),
                }
                TaskOutcome::Skipped(reason)
            }
            Ok(TransactionOutcome::Committed {
                payload, conflicts, ..
            }) => {
                match payload.kind {
                    UpdateKind::Baseline | UpdateKind::Rebaselined => bump(&counters.baselines),
                    UpdateKind::Billed | UpdateKind::CounterReset => bump(&counters.billed),
                }
                debug!(
                    kind = ?payload.kind,
                    delta = %payload.delta,
                    credits_left = %payload.credits_left,
                    conflicts,
                    "Billed measurement"
                );

                if !payload.delta.is_zero() {
                    let entry = BillingHistoryEntry::for_measurement(
                        &measurement,
                        payload.delta,
                        payload.credits_left,
                    );
                    match self.history.record(&entry).await {
                        Some(AppendOutcome::Appended) => bump(&counters.history_appended),
                        Some(AppendOutcome::DuplicateIgnored) => bump(&counters.history_duplicates),
                        None => bump(&counters.history_failures),
                    }
                }

                if let Some(crossing) = &payload.crossing {
                    if self.notifications.send(crossing).await {
                        bump(&counters.notifications_sent);
                    } else {
                        bump(&counters.notifications_failed);
                    }
                }

                TaskOutcome::Committed {
                    kind: payload.kind,
                    delta: payload.delta,
                }
            }
            Err(e) => {
                self.record_failure(&measurement, &e);
                TaskOutcome::Failed(e)
            }
        }
    }

    fn record_failure(&self, measurement: &Measurement, e: &SyncError) {
        let counters = &self.stats.counters;
        match e {
            SyncError::ConcurrencyExhausted { .. } => {
                bump(&counters.conflicts_exhausted);
                error!(measurement = %measurement, error = %e, "Dropping measurement, ledger kept changing");
            }
            SyncError::StoreUnavailable { .. } | SyncError::Aborted(_) => {
                bump(&counters.store_unavailable);
                error!(measurement = %measurement, error = %e, "Dropping measurement, attribute store unavailable");
            }
            SyncError::ProjectNotFound(_) => {
                bump(&counters.project_not_found);
                warn!(measurement = %measurement, "Dropping measurement, project has no ledger");
            }
            SyncError::Store { .. } | SyncError::Billing(_) => {
                bump(&counters.failed);
                error!(measurement = %measurement, error = %e, "Dropping measurement, billing failed");
            }
        }
    }
}

/// Starts `count` workers draining `queue`
pub fn spawn_workers(
    count: usize,
    queue: Arc<TaskQueue<BillingTask>>,
    processor: BillingProcessor,
) -> JoinSet<()> {
    let mut workers = JoinSet::new();
    for worker in 0..count {
        let queue = Arc::clone(&queue);
        let processor = processor.clone();
        workers.spawn(
            async move {
                debug!("Worker started");
                while let Some(task) = queue.dequeue().await {
                    processor.process(task).await;
                }
                debug!("Worker stopped");
            }
            .instrument(info_span!("billing_worker", worker)),
        );
    }
    info!(workers = count, "Started billing workers");
    workers
}
