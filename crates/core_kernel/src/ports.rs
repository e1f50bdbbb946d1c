//! Ports and Adapters Infrastructure
//!
//! The billing pipeline talks to three systems it does not own: the
//! attribute store holding each project's ledger, the history store and the
//! notification transport. Each is modelled as a port trait in the domain
//! crates; adapters implement them against a concrete backend.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Worker Pool                            │
//! │        (lock → fetch → compute → write → history)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Port Traits                             │
//! │     (AttributeStore, HistoryStore, Notifier)                 │
//! └─────────────────────────────────────────────────────────────┘
//!                    ▲                         ▲
//!                    │                         │
//!         ┌─────────┴─────────┐     ┌────────┴────────┐
//!         │  In-memory Adapter │     │ Remote Adapter   │
//!         │  (tests, demo)     │     │ (store protocol) │
//!         └───────────────────┘     └──────────────────┘
//! ```

use std::fmt;
use thiserror::Error;

/// Error type for port operations
///
/// A unified error type all adapters use, so retry decisions can be made
/// without knowing which backend is behind the port.
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested entity was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// The backing system could not be reached
    #[error("Service unavailable: {service}: {message}")]
    Unavailable {
        service: String,
        message: String,
    },

    /// The operation timed out
    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// The backend returned data that could not be decoded
    #[error("Transformation error: {message}")]
    Transformation {
        message: String,
    },

    /// An internal error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates an Unavailable error
    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        PortError::Unavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if this error indicates a transient failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Unavailable { .. } | PortError::Timeout { .. }
        )
    }

    /// Returns true if this error indicates the entity was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }
}

/// Marker trait for all domain ports
///
/// All port traits extend this marker so they are thread-safe and can be
/// shared between workers behind an `Arc`.
pub trait DomainPort: Send + Sync + 'static {}
