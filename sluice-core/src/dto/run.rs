//! Run DTOs for the orchestrator API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::event::TriggerEvent;
use crate::domain::job::JobStatus;
use crate::domain::log::LogEntry;
use crate::domain::run::Run;

/// Request to start a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRun {
    pub event: TriggerEvent,
}

/// Answer to a delivered event
///
/// `run` is `None` when the workflow does not react to the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOutcome {
    pub triggered: bool,
    pub run: Option<RunSummary>,
}

/// Lightweight run summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub workflow: String,
    pub event: String,
    pub status: JobStatus,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub name: String,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id,
            workflow: run.workflow.clone(),
            event: run.event.describe(),
            status: run.status,
            requested_at: run.requested_at,
            completed_at: run.completed_at,
            jobs: run
                .jobs
                .iter()
                .map(|job| JobSummary {
                    name: job.name.clone(),
                    status: job.status,
                    exit_code: job.result.as_ref().map(|r| r.exit_code),
                })
                .collect(),
        }
    }
}

impl From<Run> for RunSummary {
    fn from(run: Run) -> Self {
        RunSummary::from(&run)
    }
}

/// Captured log of one job of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogs {
    pub run_id: Uuid,
    pub job: String,
    pub entries: Vec<LogEntry>,
}
