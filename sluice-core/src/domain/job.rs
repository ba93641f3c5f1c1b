//! Job domain types

use serde::{Deserialize, Serialize};

use crate::error::StepError;

/// Job execution status
///
/// Lifecycle: `Pending -> Running -> {Succeeded, Failed}`. `Cancelled` is
/// reached only when the whole run is aborted. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Running) => true,
            (JobStatus::Pending, JobStatus::Cancelled) => true,
            (JobStatus::Running, JobStatus::Succeeded)
            | (JobStatus::Running, JobStatus::Failed)
            | (JobStatus::Running, JobStatus::Cancelled) => true,
            _ => false,
        }
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, next: JobStatus) -> Result<(), String> {
        if !self.can_transition_to(next) {
            return Err(format!("invalid job transition {:?} -> {:?}", self, next));
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "Pending"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Succeeded => write!(f, "Succeeded"),
            JobStatus::Failed => write!(f, "Failed"),
            JobStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Status of a single step within a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never executed because an earlier step failed
    NotRun,
}

/// Result of a job execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    pub exit_code: i32,
    pub failed_step: Option<String>,
    pub error_message: Option<String>,
}

impl JobResult {
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
            failed_step: None,
            error_message: None,
        }
    }

    /// Failure attributed to a step
    pub fn step_failed(step: &str, error: &StepError) -> Self {
        Self {
            success: false,
            exit_code: error.exit_code(),
            failed_step: Some(step.to_string()),
            error_message: Some(error.to_string()),
        }
    }

    /// Failure before any step ran (e.g. no environment could be acquired)
    pub fn failed(error: &StepError) -> Self {
        Self {
            success: false,
            exit_code: error.exit_code(),
            failed_step: None,
            error_message: Some(error.to_string()),
        }
    }
}

/// Execution record of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRun {
    pub name: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
}

/// Execution record of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub name: String,
    pub runs_on: String,
    pub status: JobStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub steps: Vec<StepRun>,
    pub result: Option<JobResult>,
}

impl JobRun {
    /// Fresh record with every step pending
    pub fn pending(job: &crate::domain::workflow::JobDefinition) -> Self {
        Self {
            name: job.name.clone(),
            runs_on: job.runs_on.clone(),
            status: JobStatus::Pending,
            started_at: None,
            completed_at: None,
            steps: job
                .steps
                .iter()
                .map(|step| StepRun {
                    name: step.name.clone(),
                    status: StepStatus::Pending,
                    exit_code: None,
                })
                .collect(),
            result: None,
        }
    }

    /// Names of the steps that actually executed, in execution order
    pub fn executed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Succeeded | StepStatus::Failed))
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn exit_code(&self) -> i32 {
        self.result.as_ref().map(|r| r.exit_code).unwrap_or(0)
    }

    /// Marks the job cancelled unless it already finished
    pub fn cancel(&mut self) {
        if self.status.transition(JobStatus::Cancelled).is_ok() {
            self.completed_at = Some(chrono::Utc::now());
            for step in &mut self.steps {
                if matches!(step.status, StepStatus::Pending | StepStatus::Running) {
                    step.status = StepStatus::NotRun;
                }
            }
        }
    }
}
