//! HTTP API Layer
//!
//! This crate exposes the billing pipeline over HTTP using Axum.
//!
//! # Routes
//!
//! - `POST /write`: line-protocol measurements, queued for billing
//! - `GET /ping`: liveness
//! - `GET /stats`: pipeline statistics
//! - `GET /api/credits`: billable measurements
//! - `POST /api/credits`: hourly cost of a machine specification
//! - `GET /api/credits_history/:project`: billing history of a project
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let app = create_router(AppState::new(pipeline, history_store));
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod dto;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_billing::HistoryStore;
use infra_pipeline::Pipeline;

use crate::handlers::{credits, health, ingest};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub history: Arc<dyn HistoryStore>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, history: Arc<dyn HistoryStore>) -> Self {
        Self { pipeline, history }
    }
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/credits",
            get(credits::list_measurements).post(credits::costs_per_hour),
        )
        .route("/credits_history/:project", get(credits::credits_history));

    Router::new()
        .route("/write", post(ingest::write))
        .route("/ping", get(health::ping))
        .route("/stats", get(health::stats))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
