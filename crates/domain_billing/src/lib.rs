//! Billing Domain - Credit Ledgers
//!
//! This crate turns usage measurements into credit charges against a
//! project's ledger, keeping the ledger consistent under concurrent
//! writers.
//!
//! # Ledger Model
//!
//! Each project has one [`GroupLedgerState`] in the external attribute
//! store:
//! - `credits_granted`: what the project may spend
//! - `credits_used`: what it has spent, quantised to the credit precision
//! - one cursor per metric: the last billed value and timestamp
//! - the last low-balance threshold the project was notified about
//!
//! # Billing Step
//!
//! 1. Fetch the ledger and its version
//! 2. Compute the new ledger ([`CreditCalculator`], [`NotificationPolicy`])
//! 3. Write it conditionally; on conflict go back to 1
//! 4. After the commit, append history and send notifications
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{AttributeSyncClient, BillingTransaction, RetryPolicy};
//!
//! let client = AttributeSyncClient::new(store, RetryPolicy::default());
//! let billing = BillingTransaction::default();
//!
//! let outcome = client
//!     .transact(&measurement.project, |ledger| billing.plan(&measurement, ledger))
//!     .await?;
//! ```

pub mod ledger;
pub mod calculator;
pub mod notification;
pub mod transaction;
pub mod history;
pub mod ports;
pub mod sync;
pub mod adapters;
pub mod error;

pub use ledger::{GroupLedgerState, LedgerVersion, MetricCursor, VersionedLedger};
pub use calculator::{Calculation, CreditCalculator, SkipReason, UpdateKind};
pub use notification::{
    NotificationPolicy, NotificationTrigger, Notifier, Threshold, ThresholdCrossing,
};
pub use transaction::{BillingReceipt, BillingTransaction};
pub use history::{BillingHistoryEntry, HistoryKey, HistoryRecorder};
pub use ports::{AppendOutcome, AttributeStore, HistoryStore, WriteOutcome};
pub use sync::{AttributeSyncClient, Mutation, RetryPolicy, TransactionOutcome};
pub use adapters::{
    InMemoryAttributeStore, InMemoryHistoryStore, LogNotifier, RecordingNotifier, StoreActivity,
};
pub use error::{BillingError, SyncError};
