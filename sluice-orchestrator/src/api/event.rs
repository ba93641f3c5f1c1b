//! Event API Handlers
//!
//! Webhook endpoints for events delivered by the hosting platform.

use axum::{Json, extract::State, http::StatusCode};
use sluice_core::domain::event::{PullRequestEvent, TriggerEvent};
use sluice_core::domain::run::Run;
use sluice_core::dto::run::{EventOutcome, RunSummary};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::service::run_service::RunService;

/// POST /api/events/pull_request
/// Starts a run when the pull-request action triggers the workflow
pub async fn pull_request(
    State(service): State<Arc<RunService>>,
    Json(event): Json<PullRequestEvent>,
) -> ApiResult<(StatusCode, Json<EventOutcome>)> {
    tracing::info!(
        "Received pull_request #{} ({}) for {}",
        event.number,
        event.action,
        event.repository
    );

    let run = service.trigger(TriggerEvent::PullRequest(event)).await?;

    Ok(event_outcome(run))
}

/// 202 with the created run, or 200 when nothing was started
pub(crate) fn event_outcome(run: Option<Run>) -> (StatusCode, Json<EventOutcome>) {
    match run {
        Some(run) => (
            StatusCode::ACCEPTED,
            Json(EventOutcome {
                triggered: true,
                run: Some(RunSummary::from(&run)),
            }),
        ),
        None => (
            StatusCode::OK,
            Json(EventOutcome {
                triggered: false,
                run: None,
            }),
        ),
    }
}
