//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! credits pipeline test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built projects, metrics and line-protocol records
//! - `builders`: Builder patterns for measurements, ledgers and stores
//! - `assertions`: Custom assertion helpers for credits and ledgers
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use generators::*;
