//! Request handlers

pub mod credits;
pub mod health;
pub mod ingest;
