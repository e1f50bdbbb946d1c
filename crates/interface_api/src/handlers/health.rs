//! Liveness and statistics handlers

use axum::{extract::State, Json};

use infra_pipeline::StatsSnapshot;

use crate::AppState;

/// Liveness endpoint
pub async fn ping() -> &'static str {
    "Pong"
}

/// Current pipeline statistics
pub async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.pipeline.stats())
}
