//! Ingestion DTOs

use serde::Serialize;

use infra_pipeline::BatchReport;

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub ignored: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl From<BatchReport> for WriteResponse {
    fn from(report: BatchReport) -> Self {
        Self {
            accepted: report.accepted,
            rejected: report.rejected,
            ignored: report.ignored,
            errors: report.errors,
        }
    }
}
