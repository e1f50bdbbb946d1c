//! Core Kernel - Foundational types for the credits billing pipeline
//!
//! This crate provides the building blocks shared by every other crate:
//! - Credits with precise decimal arithmetic and configurable precision
//! - Validated project/resource names and task identifiers
//! - The port error type all external adapters report through

pub mod credits;
pub mod identifiers;
pub mod ports;

pub use credits::{Credits, CreditRate, CreditPrecision, CreditsError};
pub use identifiers::{ProjectId, ResourceId, TaskId, IdentifierError};
pub use ports::{PortError, DomainPort};
