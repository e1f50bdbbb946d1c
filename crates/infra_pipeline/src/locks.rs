//! Per-project lock table
//!
//! At most one billing transaction per project is in flight inside this
//! process. Transactions for different projects never wait on each other.
//!
//! Locks are created on first use. With eviction enabled a lock is removed
//! when its last holder releases it and nobody is waiting for it, so the
//! table only holds projects with work in progress. Release and the
//! eviction check happen under the table mutex, which is also taken to
//! hand out locks; a lock can therefore not be evicted between a waiter
//! looking it up and queueing on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::trace;

use core_kernel::ProjectId;

type LockMap = HashMap<ProjectId, Arc<tokio::sync::Mutex<()>>>;

/// Keyed mutual exclusion over projects
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Arc<Mutex<LockMap>>,
    evict_idle: bool,
}

impl LockTable {
    /// Creates a table; with `evict_idle` unused locks are dropped on release
    pub fn new(evict_idle: bool) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            evict_idle,
        }
    }

    /// Waits until the project's lock is free and takes it
    pub async fn acquire(&self, project: &ProjectId) -> ProjectLockGuard {
        let lock = {
            let mut locks = lock_map(&self.locks);
            Arc::clone(locks.entry(project.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        trace!(project = %project, "Acquired project lock");

        ProjectLockGuard {
            project: project.clone(),
            guard: Some(guard),
            table: self.evict_idle.then(|| Arc::clone(&self.locks)),
        }
    }

    /// Number of projects that currently have a lock
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        lock_map(&self.locks).is_empty()
    }
}

/// Holds a project's lock until dropped
#[derive(Debug)]
pub struct ProjectLockGuard {
    project: ProjectId,
    guard: Option<OwnedMutexGuard<()>>,
    table: Option<Arc<Mutex<LockMap>>>,
}

impl ProjectLockGuard {
    pub fn project(&self) -> &ProjectId {
        &self.project
    }
}

impl Drop for ProjectLockGuard {
    fn drop(&mut self) {
        let Some(table) = self.table.take() else {
            return;
        };
        let mut locks = lock_map(&table);
        drop(self.guard.take());

        let idle = locks
            .get(&self.project)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.project);
            trace!(project = %self.project, "Evicted idle project lock");
        }
    }
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(PoisonError::into_inner)
}
