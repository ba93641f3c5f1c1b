//! Run API Handlers
//!
//! HTTP endpoints for starting, inspecting and cancelling runs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use sluice_core::domain::run::Run;
use sluice_core::dto::run::{EventOutcome, JobLogs, RunSummary, TriggerRun};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::event::event_outcome;
use crate::service::run_service::RunService;

/// POST /api/runs
/// Starts a run for a manual or pull-request event
pub async fn trigger_run(
    State(service): State<Arc<RunService>>,
    Json(req): Json<TriggerRun>,
) -> ApiResult<(StatusCode, Json<EventOutcome>)> {
    tracing::info!("Run requested for {}", req.event.describe());

    let run = service.trigger(req.event).await?;

    Ok(event_outcome(run))
}

/// GET /api/runs
/// List all runs, newest first
pub async fn list_runs(State(service): State<Arc<RunService>>) -> ApiResult<Json<Vec<RunSummary>>> {
    tracing::debug!("Listing runs");

    let runs = service.list_runs().await;

    Ok(Json(runs.iter().map(RunSummary::from).collect()))
}

/// GET /api/runs/{id}
pub async fn get_run(
    State(service): State<Arc<RunService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Run>> {
    tracing::debug!("Getting run: {}", id);

    let run = service.get_run(id).await?;

    Ok(Json(run))
}

/// GET /api/runs/{id}/jobs/{job}/logs
pub async fn get_job_logs(
    State(service): State<Arc<RunService>>,
    Path((id, job)): Path<(Uuid, String)>,
) -> ApiResult<Json<JobLogs>> {
    tracing::debug!("Getting logs of job '{}' in run {}", job, id);

    let entries = service.get_job_logs(id, &job).await?;

    Ok(Json(JobLogs {
        run_id: id,
        job,
        entries,
    }))
}

/// POST /api/runs/{id}/cancel
pub async fn cancel_run(
    State(service): State<Arc<RunService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Run>> {
    tracing::info!("Cancelling run: {}", id);

    let run = service.cancel_run(id).await?;

    Ok(Json(run))
}
