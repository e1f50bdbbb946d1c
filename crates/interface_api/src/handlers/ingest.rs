//! Measurement ingestion

use axum::{extract::State, http::StatusCode, Json};
use tracing::debug;

use crate::dto::ingest::WriteResponse;
use crate::{error::ApiError, AppState};

/// Accepts a body of line-protocol records
///
/// Each non-blank line is parsed and queued on its own; rejected lines are
/// reported in the response and do not fail the request.
pub async fn write(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<WriteResponse>), ApiError> {
    let report = state.pipeline.submit_batch(&body)?;
    debug!(
        accepted = report.accepted,
        rejected = report.rejected,
        ignored = report.ignored,
        "Received measurements"
    );
    Ok((StatusCode::ACCEPTED, Json(report.into())))
}
