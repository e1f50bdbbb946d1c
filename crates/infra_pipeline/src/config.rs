//! Pipeline configuration
//!
//! Everything the billing pipeline needs to know at start-up: pool size,
//! retry budgets, drain timeout, credit precision, which projects to bill
//! and which thresholds to notify about.

use std::collections::HashSet;
use std::time::Duration;

use core_kernel::{CreditPrecision, ProjectId};
use domain_billing::{NotificationPolicy, RetryPolicy};
use crate::error::PipelineError;

/// Configuration options for the billing pipeline
///
/// # Example
///
/// ```rust
/// use infra_pipeline::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig::new()
///     .workers(4)
///     .max_conflicts(5)
///     .drain_timeout(Duration::from_secs(10));
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent billing workers
    pub workers: usize,
    /// Retry budgets of the attribute sync client
    pub retry: RetryPolicy,
    /// How long shutdown waits for queued work before dropping it
    pub drain_timeout: Duration,
    /// Decimal places credits are rounded to
    pub precision: CreditPrecision,
    /// Projects to bill; `None` bills every project
    pub project_whitelist: Option<HashSet<ProjectId>>,
    /// Low-balance thresholds
    pub notification: NotificationPolicy,
    /// Drop a project's lock once nobody holds or waits for it
    pub evict_idle_locks: bool,
}

impl PipelineConfig {
    /// Creates a configuration with default values
    pub fn new() -> Self {
        Self {
            workers: 10,
            retry: RetryPolicy::default(),
            drain_timeout: Duration::from_secs(30),
            precision: CreditPrecision::default(),
            project_whitelist: None,
            notification: NotificationPolicy::default(),
            evict_idle_locks: true,
        }
    }

    /// Sets the number of workers (default: 10)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets how many conflicting writes a transaction tolerates (default: 3)
    pub fn max_conflicts(mut self, max: u32) -> Self {
        self.retry.max_conflicts = max;
        self
    }

    /// Sets how often an unreachable store is retried (default: 3)
    pub fn max_unavailable_retries(mut self, max: u32) -> Self {
        self.retry.max_unavailable_retries = max;
        self
    }

    /// Sets the exponential backoff bounds (default: 100ms up to 5s)
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.retry.initial_backoff = initial;
        self.retry.max_backoff = max;
        self
    }

    /// Sets the shutdown drain timeout (default: 30s)
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Sets the credit precision (default: 2 decimal places)
    pub fn precision(mut self, precision: CreditPrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Restricts billing to the given projects
    pub fn project_whitelist(mut self, projects: impl IntoIterator<Item = ProjectId>) -> Self {
        self.project_whitelist = Some(projects.into_iter().collect());
        self
    }

    /// Sets the notification thresholds (default: half of granted)
    pub fn notification_policy(mut self, policy: NotificationPolicy) -> Self {
        self.notification = policy;
        self
    }

    /// Enables or disables idle lock eviction (default: enabled)
    pub fn evict_idle_locks(mut self, evict: bool) -> Self {
        self.evict_idle_locks = evict;
        self
    }

    /// Checks the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.retry.max_conflicts == 0 {
            return Err(PipelineError::Configuration(
                "conflict budget must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(PipelineError::Configuration(format!(
                "initial backoff {:?} exceeds max backoff {:?}",
                self.retry.initial_backoff, self.retry.max_backoff
            )));
        }
        Ok(())
    }

    /// Returns true if measurements for `project` should be billed
    pub fn is_billed(&self, project: &ProjectId) -> bool {
        self.project_whitelist
            .as_ref()
            .map_or(true, |whitelist| whitelist.contains(project))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}
