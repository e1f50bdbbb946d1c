//! Adapters for the billing ports
//!
//! # Available Adapters
//!
//! - **InMemoryAttributeStore**, **InMemoryHistoryStore**: process-local
//!   stores with fault injection, used by the standalone server and tests
//! - **RecordingNotifier**: keeps sent notifications for inspection
//! - **LogNotifier**: writes notifications to the log
//!
//! Adapters for a remote attribute store plug in through the same traits:
//!
//! ```rust,ignore
//! let store: Arc<dyn AttributeStore> = match config.store {
//!     StoreKind::Memory => Arc::new(InMemoryAttributeStore::with_default_grant(grant)),
//!     StoreKind::Remote => Arc::new(RemoteAttributeStore::connect(&config.url).await?),
//! };
//! ```

pub mod log_notifier;
pub mod memory;

pub use log_notifier::LogNotifier;
pub use memory::{InMemoryAttributeStore, InMemoryHistoryStore, RecordingNotifier, StoreActivity};
