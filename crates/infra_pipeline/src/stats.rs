//! Pipeline statistics
//!
//! Lock-free counters updated by ingestion and workers, and the snapshot
//! served by the stats endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Running counters of the pipeline
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub accepted: AtomicU64,
    pub parse_errors: AtomicU64,
    pub unknown_metrics: AtomicU64,
    pub whitelist_skipped: AtomicU64,
    pub billed: AtomicU64,
    pub baselines: AtomicU64,
    pub stale: AtomicU64,
    pub below_precision: AtomicU64,
    pub conflicts_exhausted: AtomicU64,
    pub store_unavailable: AtomicU64,
    pub project_not_found: AtomicU64,
    pub failed: AtomicU64,
    pub history_appended: AtomicU64,
    pub history_duplicates: AtomicU64,
    pub history_failures: AtomicU64,
    pub notifications_sent: AtomicU64,
    pub notifications_failed: AtomicU64,
    pub shutdown_dropped: AtomicU64,
}

/// Increments a counter by one
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl PipelineCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            accepted: read(&self.accepted),
            parse_errors: read(&self.parse_errors),
            unknown_metrics: read(&self.unknown_metrics),
            whitelist_skipped: read(&self.whitelist_skipped),
            billed: read(&self.billed),
            baselines: read(&self.baselines),
            stale: read(&self.stale),
            below_precision: read(&self.below_precision),
            conflicts_exhausted: read(&self.conflicts_exhausted),
            store_unavailable: read(&self.store_unavailable),
            project_not_found: read(&self.project_not_found),
            failed: read(&self.failed),
            history_appended: read(&self.history_appended),
            history_duplicates: read(&self.history_duplicates),
            history_failures: read(&self.history_failures),
            notifications_sent: read(&self.notifications_sent),
            notifications_failed: read(&self.notifications_failed),
            shutdown_dropped: read(&self.shutdown_dropped),
        }
    }
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub accepted: u64,
    pub parse_errors: u64,
    pub unknown_metrics: u64,
    pub whitelist_skipped: u64,
    pub billed: u64,
    pub baselines: u64,
    pub stale: u64,
    pub below_precision: u64,
    pub conflicts_exhausted: u64,
    pub store_unavailable: u64,
    pub project_not_found: u64,
    pub failed: u64,
    pub history_appended: u64,
    pub history_duplicates: u64,
    pub history_failures: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub shutdown_dropped: u64,
}

impl CounterSnapshot {
    /// Measurements that reached a terminal state in a worker
    pub fn processed(&self) -> u64 {
        self.billed
            + self.baselines
            + self.stale
            + self.below_precision
            + self.conflicts_exhausted
            + self.store_unavailable
            + self.project_not_found
            + self.failed
    }
}

/// Shared statistics of one pipeline
#[derive(Debug)]
pub struct PipelineStats {
    pub counters: PipelineCounters,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            counters: PipelineCounters::default(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the stats endpoint reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub workers: usize,
    pub queue_size: usize,
    pub locks: usize,
    pub accepting: bool,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub counters: CounterSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_bumps() {
        let stats = PipelineStats::new();
        bump(&stats.counters.accepted);
        bump(&stats.counters.accepted);
        bump(&stats.counters.billed);
        bump(&stats.counters.stale);

        let snapshot = stats.counters.snapshot();
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.processed(), 2);
    }

    #[test]
    fn test_stats_snapshot_json_shape() {
        let stats = PipelineStats::new();
        bump(&stats.counters.shutdown_dropped);
        let snapshot = StatsSnapshot {
            workers: 4,
            queue_size: 1,
            locks: 2,
            accepting: false,
            started_at: stats.started_at(),
            uptime_secs: stats.uptime_secs(),
            counters: stats.counters.snapshot(),
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["workers"], 4);
        assert_eq!(json["locks"], 2);
        assert_eq!(json["counters"]["shutdown_dropped"], 1);

        let back: StatsSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
