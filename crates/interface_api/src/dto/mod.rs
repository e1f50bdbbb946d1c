//! Request and response bodies

pub mod credits;
pub mod ingest;
