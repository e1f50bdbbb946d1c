//! In-memory adapters
//!
//! Process-local implementations of the billing ports. They back the
//! standalone server and every test that needs a store. Faults can be
//! injected to exercise the retry paths: outages, version conflicts and
//! artificial latency between a fetch and the following write.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use core_kernel::{Credits, DomainPort, PortError, ProjectId};
use crate::history::{BillingHistoryEntry, HistoryKey};
use crate::ledger::{GroupLedgerState, LedgerVersion, VersionedLedger};
use crate::notification::{Notifier, ThresholdCrossing};
use crate::ports::{AppendOutcome, AttributeStore, HistoryStore, WriteOutcome};

const ATTRIBUTE_STORE: &str = "in-memory-attribute-store";
const HISTORY_STORE: &str = "in-memory-history-store";

#[derive(Debug, Clone)]
struct StoredLedger {
    state: GroupLedgerState,
    version: u64,
}

/// Counters of what happened to the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreActivity {
    pub fetches: u64,
    pub write_attempts: u64,
    pub commits: u64,
    pub version_conflicts: u64,
}

#[derive(Debug, Default)]
struct Faults {
    conflicts: u32,
    unavailable_fetches: u32,
    unavailable_writes: u32,
}

/// Attribute store keeping ledgers in a map
///
/// Versions are a per-project counter bumped on every committed write.
#[derive(Debug, Default)]
pub struct InMemoryAttributeStore {
    ledgers: RwLock<HashMap<ProjectId, StoredLedger>>,
    default_grant: Option<Credits>,
    latency: Option<Duration>,
    faults: Mutex<Faults>,
    activity: Mutex<StoreActivity>,
}

impl InMemoryAttributeStore {
    /// Creates an empty store that reports unknown projects as not found
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that opens a ledger with `granted` credits for any
    /// project fetched for the first time
    pub fn with_default_grant(granted: Credits) -> Self {
        Self {
            default_grant: Some(granted),
            ..Self::default()
        }
    }

    /// Delays every fetch and write by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Stores a ledger, replacing any existing one
    pub async fn insert(&self, state: GroupLedgerState) {
        let mut ledgers = self.ledgers.write().await;
        let version = ledgers.get(&state.project).map_or(0, |l| l.version + 1);
        ledgers.insert(state.project.clone(), StoredLedger { state, version });
    }

    /// Returns the current ledger of a project
    pub async fn ledger(&self, project: &ProjectId) -> Option<GroupLedgerState> {
        self.ledgers
            .read()
            .await
            .get(project)
            .map(|l| l.state.clone())
    }

    /// Returns every stored ledger
    pub async fn ledgers(&self) -> Vec<GroupLedgerState> {
        let mut all: Vec<_> = self
            .ledgers
            .read()
            .await
            .values()
            .map(|l| l.state.clone())
            .collect();
        all.sort_by(|a, b| a.project.cmp(&b.project));
        all
    }

    /// Modifies a ledger as another writer would, bumping its version
    pub async fn update<F>(&self, project: &ProjectId, change: F) -> Result<(), PortError>
    where
        F: FnOnce(&mut GroupLedgerState),
    {
        let mut ledgers = self.ledgers.write().await;
        let stored = ledgers
            .get_mut(project)
            .ok_or_else(|| PortError::not_found("Project", project))?;
        change(&mut stored.state);
        stored.version += 1;
        Ok(())
    }

    /// Makes the next `count` writes report a version conflict
    pub async fn inject_conflicts(&self, count: u32) {
        self.faults.lock().await.conflicts = count;
    }

    /// Makes the next `count` fetches fail as unavailable
    pub async fn inject_unavailable_fetches(&self, count: u32) {
        self.faults.lock().await.unavailable_fetches = count;
    }

    /// Makes the next `count` writes fail as unavailable
    pub async fn inject_unavailable_writes(&self, count: u32) {
        self.faults.lock().await.unavailable_writes = count;
    }

    pub async fn activity(&self) -> StoreActivity {
        *self.activity.lock().await
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl DomainPort for InMemoryAttributeStore {}

#[async_trait]
impl AttributeStore for InMemoryAttributeStore {
    #[instrument(skip(self, project), fields(project = %project))]
    async fn fetch(&self, project: &ProjectId) -> Result<VersionedLedger, PortError> {
        {
            let mut faults = self.faults.lock().await;
            if faults.unavailable_fetches > 0 {
                faults.unavailable_fetches -= 1;
                return Err(PortError::unavailable(ATTRIBUTE_STORE, "injected outage"));
            }
        }

        let stored = {
            let mut ledgers = self.ledgers.write().await;
            match (ledgers.get(project), self.default_grant) {
                (Some(stored), _) => stored.clone(),
                (None, Some(granted)) => {
                    let stored = StoredLedger {
                        state: GroupLedgerState::new(project.clone(), granted),
                        version: 0,
                    };
                    ledgers.insert(project.clone(), stored.clone());
                    stored
                }
                (None, None) => return Err(PortError::not_found("Project", project)),
            }
        };
        self.activity.lock().await.fetches += 1;
        self.delay().await;

        Ok(VersionedLedger {
            state: stored.state,
            version: LedgerVersion::new(stored.version.to_string()),
        })
    }

    #[instrument(skip(self, project, state, expected), fields(project = %project, expected = %expected))]
    async fn write(
        &self,
        project: &ProjectId,
        state: &GroupLedgerState,
        expected: &LedgerVersion,
    ) -> Result<WriteOutcome, PortError> {
        self.delay().await;
        {
            let mut faults = self.faults.lock().await;
            if faults.unavailable_writes > 0 {
                faults.unavailable_writes -= 1;
                return Err(PortError::unavailable(ATTRIBUTE_STORE, "injected outage"));
            }
            if faults.conflicts > 0 {
                faults.conflicts -= 1;
                let mut activity = self.activity.lock().await;
                activity.write_attempts += 1;
                activity.version_conflicts += 1;
                return Ok(WriteOutcome::VersionConflict);
            }
        }

        let mut ledgers = self.ledgers.write().await;
        let stored = ledgers
            .get_mut(project)
            .ok_or_else(|| PortError::not_found("Project", project))?;

        let mut activity = self.activity.lock().await;
        activity.write_attempts += 1;
        if stored.version.to_string() != expected.as_str() {
            activity.version_conflicts += 1;
            return Ok(WriteOutcome::VersionConflict);
        }

        stored.version += 1;
        stored.state = state.clone();
        activity.commits += 1;
        Ok(WriteOutcome::Committed(LedgerVersion::new(
            stored.version.to_string(),
        )))
    }
}

/// History store keeping entries ordered by key
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    entries: RwLock<BTreeMap<HistoryKey, BillingHistoryEntry>>,
    unavailable_appends: Mutex<u32>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` appends fail as unavailable
    pub async fn inject_unavailable_appends(&self, count: u32) {
        *self.unavailable_appends.lock().await = count;
    }

    /// Returns every entry across projects
    pub async fn all(&self) -> Vec<BillingHistoryEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl DomainPort for InMemoryHistoryStore {}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    #[instrument(skip(self, entry), fields(project = %entry.project, metric = %entry.metric))]
    async fn append(&self, entry: &BillingHistoryEntry) -> Result<AppendOutcome, PortError> {
        {
            let mut unavailable = self.unavailable_appends.lock().await;
            if *unavailable > 0 {
                *unavailable -= 1;
                return Err(PortError::unavailable(HISTORY_STORE, "injected outage"));
            }
        }

        let mut entries = self.entries.write().await;
        let key = entry.key();
        if entries.contains_key(&key) {
            return Ok(AppendOutcome::DuplicateIgnored);
        }
        entries.insert(key, entry.clone());
        Ok(AppendOutcome::Appended)
    }

    async fn entries(&self, project: &ProjectId) -> Result<Vec<BillingHistoryEntry>, PortError> {
        let mut found: Vec<_> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| &e.project == project)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.timestamp);
        Ok(found)
    }
}

/// Notifier remembering what it was asked to send
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<ThresholdCrossing>>,
    failures: Mutex<u32>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail
    pub async fn inject_failures(&self, count: u32) {
        *self.failures.lock().await = count;
    }

    pub async fn sent(&self) -> Vec<ThresholdCrossing> {
        self.sent.lock().await.clone()
    }
}

impl DomainPort for RecordingNotifier {}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, crossing: &ThresholdCrossing) -> Result<(), PortError> {
        {
            let mut failures = self.failures.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(PortError::unavailable("recording-notifier", "injected failure"));
            }
        }
        self.sent.lock().await.push(crossing.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn project() -> ProjectId {
        ProjectId::new("demo").unwrap()
    }

    #[tokio::test]
    async fn test_unknown_project_is_not_found() {
        let store = InMemoryAttributeStore::new();
        let err = store.fetch(&project()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_default_grant_opens_ledger() {
        let store = InMemoryAttributeStore::with_default_grant(Credits::new(dec!(50)));
        let fetched = store.fetch(&project()).await.unwrap();
        assert_eq!(fetched.state.credits_granted.amount(), dec!(50));
        assert!(store.ledger(&project()).await.is_some());
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemoryAttributeStore::new();
        store
            .insert(GroupLedgerState::new(project(), Credits::new(dec!(10))))
            .await;
        let fetched = store.fetch(&project()).await.unwrap();

        store
            .update(&project(), |s| s.credits_granted = Credits::new(dec!(20)))
            .await
            .unwrap();

        let outcome = store
            .write(&project(), &fetched.state, &fetched.version)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::VersionConflict);
        assert_eq!(
            store.ledger(&project()).await.unwrap().credits_granted.amount(),
            dec!(20)
        );
    }

    #[tokio::test]
    async fn test_matching_version_commits() {
        let store = InMemoryAttributeStore::new();
        store
            .insert(GroupLedgerState::new(project(), Credits::new(dec!(10))))
            .await;
        let fetched = store.fetch(&project()).await.unwrap();

        let mut next = fetched.state.clone();
        next.credits_used = Credits::new(dec!(1));
        let outcome = store.write(&project(), &next, &fetched.version).await.unwrap();

        assert!(matches!(outcome, WriteOutcome::Committed(v) if v != fetched.version));
        assert_eq!(store.activity().await.commits, 1);
    }

    #[tokio::test]
    async fn test_history_duplicates_are_ignored() {
        let store = InMemoryHistoryStore::new();
        let entry = BillingHistoryEntry {
            project: project(),
            timestamp: domain_metering::Timestamp::from_nanos(1),
            metric: "vcpu".to_string(),
            metric_friendly_name: "cpu".to_string(),
            delta: Credits::new(dec!(1)),
            credits_left: Credits::new(dec!(9)),
        };

        assert_eq!(store.append(&entry).await.unwrap(), AppendOutcome::Appended);
        assert_eq!(store.append(&entry).await.unwrap(), AppendOutcome::DuplicateIgnored);
        assert_eq!(store.len().await, 1);
    }
}
