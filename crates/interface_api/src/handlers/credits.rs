//! Credits handlers

use axum::{
    extract::{Path, State},
    Json,
};
use std::collections::BTreeMap;

use core_kernel::ProjectId;

use crate::dto::credits::*;
use crate::{error::ApiError, AppState};

/// Lists the billable measurements keyed by friendly name
pub async fn list_measurements(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, MeasurementInfo>> {
    let measurements = state
        .pipeline
        .registry()
        .descriptors()
        .iter()
        .map(|d| (d.friendly_name().to_string(), MeasurementInfo::from(d.as_ref())))
        .collect();
    Json(measurements)
}

/// Estimates the hourly cost of a machine specification
pub async fn costs_per_hour(
    State(state): State<AppState>,
    Json(specs): Json<CostEstimateRequest>,
) -> Result<Json<CostEstimateResponse>, ApiError> {
    let credits = state
        .pipeline
        .registry()
        .costs_per_hour(&specs, state.pipeline.config().precision)?;
    Ok(Json(CostEstimateResponse {
        credits_per_hour: credits.amount(),
    }))
}

/// Billing history of one project
pub async fn credits_history(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<CreditsHistoryResponse>, ApiError> {
    let project = ProjectId::new(project).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let entries = state.history.entries(&project).await?;
    Ok(Json(entries.into_iter().collect()))
}
