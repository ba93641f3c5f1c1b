//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod event;
pub mod health;
pub mod run;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::run_service::RunService;

/// Create the main API router with all endpoints
pub fn create_router(service: Arc<RunService>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Webhooks
        .route("/api/events/pull_request", post(event::pull_request))
        // Run endpoints
        .route("/api/runs", post(run::trigger_run))
        .route("/api/runs", get(run::list_runs))
        .route("/api/runs/{id}", get(run::get_run))
        .route("/api/runs/{id}/jobs/{job}/logs", get(run::get_job_logs))
        .route("/api/runs/{id}/cancel", post(run::cancel_run))
        // Add state and middleware
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}
