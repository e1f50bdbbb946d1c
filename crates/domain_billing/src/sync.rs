//! Attribute sync client
//!
//! Runs read-modify-write transactions against the [`AttributeStore`]:
//! fetch the ledger with its version, let the caller compute the new
//! ledger, write it conditionally. A version conflict means another writer
//! got there first; the client fetches again and lets the caller recompute
//! from the fresh ledger, never re-applying a stale result.
//!
//! Two retry budgets apply independently:
//!
//! - conflicts: after `max_conflicts` conflicting writes in a row the
//!   transaction gives up with `ConcurrencyExhausted`
//! - unavailability: each fetch or write is retried with exponential
//!   backoff up to `max_unavailable_retries` times
//!
//! A write that fails as unavailable may still have been applied. Retrying
//! it with the same expected version then conflicts, and the recomputation
//! sees the advanced cursor and skips, so nothing is billed twice.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use core_kernel::{PortError, ProjectId};
use crate::error::{BillingError, SyncError};
use crate::ledger::{GroupLedgerState, LedgerVersion};
use crate::ports::{AttributeStore, WriteOutcome};

/// Retry budgets of the sync client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Conflicting writes tolerated before giving up
    pub max_conflicts: u32,
    /// Retries of a single fetch or write while the store is unreachable
    pub max_unavailable_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_conflicts: 3,
            max_unavailable_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry, starting at 1
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}

/// What the caller wants done with a fetched ledger
#[derive(Debug)]
pub enum Mutation<S, W> {
    /// Leave the ledger as it is
    Skip(S),
    /// Write this ledger
    Write(GroupLedgerState, W),
}

/// How a transaction ended
#[derive(Debug)]
pub enum TransactionOutcome<S, W> {
    /// The caller chose not to write
    Skipped(S),
    /// The new ledger was written
    Committed {
        previous: GroupLedgerState,
        state: GroupLedgerState,
        version: LedgerVersion,
        payload: W,
        /// Conflicting writes before this one succeeded
        conflicts: u32,
    },
}

/// Executes ledger transactions against an attribute store
#[derive(Clone)]
pub struct AttributeSyncClient {
    store: Arc<dyn AttributeStore>,
    retry: RetryPolicy,
    abort: Option<watch::Receiver<bool>>,
}

impl AttributeSyncClient {
    pub fn new(store: Arc<dyn AttributeStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            abort: None,
        }
    }

    /// Cuts backoff waits short once `true` is published on the channel
    pub fn with_abort_signal(mut self, abort: watch::Receiver<bool>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Runs one read-modify-write transaction
    ///
    /// `plan` is called with every freshly fetched ledger and must derive
    /// the ledger to write from that argument alone.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyExhausted` after too many conflicting writes
    /// - `StoreUnavailable` once the unavailability budget is spent
    /// - `ProjectNotFound` if the store has no ledger for the project
    /// - `Aborted` if shutdown interrupted a backoff
    /// - `Billing` if `plan` failed
    pub async fn transact<S, W, F>(
        &self,
        project: &ProjectId,
        mut plan: F,
    ) -> Result<TransactionOutcome<S, W>, SyncError>
    where
        F: FnMut(&GroupLedgerState) -> Result<Mutation<S, W>, BillingError>,
    {
        let mut conflicts = 0u32;
        loop {
            let fetched = self
                .with_backoff(project, "fetch", || self.store.fetch(project))
                .await?;

            let (state, payload) = match plan(&fetched.state)? {
                Mutation::Skip(payload) => return Ok(TransactionOutcome::Skipped(payload)),
                Mutation::Write(state, payload) => (state, payload),
            };

            let outcome = self
                .with_backoff(project, "write", || {
                    self.store.write(project, &state, &fetched.version)
                })
                .await?;

            match outcome {
                WriteOutcome::Committed(version) => {
                    debug!(
                        project = %project,
                        version = %version,
                        conflicts,
                        "Committed ledger"
                    );
                    return Ok(TransactionOutcome::Committed {
                        previous: fetched.state,
                        state,
                        version,
                        payload,
                        conflicts,
                    });
                }
                WriteOutcome::VersionConflict => {
                    conflicts += 1;
                    if conflicts >= self.retry.max_conflicts {
                        warn!(project = %project, conflicts, "Giving up on conflicting ledger");
                        return Err(SyncError::ConcurrencyExhausted {
                            project: project.clone(),
                            attempts: conflicts,
                        });
                    }
                    debug!(
                        project = %project,
                        expected = %fetched.version,
                        conflicts,
                        "Ledger version conflict, recomputing"
                    );
                }
            }
        }
    }

    async fn with_backoff<R, Fut>(
        &self,
        project: &ProjectId,
        operation: &'static str,
        mut call: impl FnMut() -> Fut,
    ) -> Result<R, SyncError>
    where
        Fut: Future<Output = Result<R, PortError>>,
    {
        let mut retries = 0u32;
        loop {
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if error.is_not_found() {
                return Err(SyncError::ProjectNotFound(project.clone()));
            }
            if !error.is_transient() {
                return Err(SyncError::Store {
                    project: project.clone(),
                    source: error,
                });
            }
            if retries >= self.retry.max_unavailable_retries {
                return Err(SyncError::StoreUnavailable {
                    project: project.clone(),
                    attempts: retries + 1,
                    source: error,
                });
            }

            retries += 1;
            let delay = self.retry.backoff(retries);
            warn!(
                project = %project,
                operation,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attribute store unavailable, backing off"
            );
            if self.sleep_or_abort(delay).await {
                return Err(SyncError::Aborted(project.clone()));
            }
        }
    }

    /// Sleeps for `delay`, returning true if aborted first
    async fn sleep_or_abort(&self, delay: Duration) -> bool {
        let Some(mut abort) = self.abort.clone() else {
            tokio::time::sleep(delay).await;
            return false;
        };
        if *abort.borrow() {
            return true;
        }
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        let aborted = tokio::select! {
            _ = &mut sleep => return false,
            changed = abort.wait_for(|aborted| *aborted) => changed.is_ok(),
        };
        if !aborted {
            // signal sender gone, nobody can abort any more
            sleep.await;
        }
        aborted
    }
}
