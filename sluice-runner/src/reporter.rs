//! Run progress callbacks
//!
//! The scheduler and executor report every state change through a
//! `RunReporter`; the CLI prints them, the orchestrator stores them.

use sluice_core::domain::job::{JobRun, StepRun};
use sluice_core::domain::run::Run;
use uuid::Uuid;

use crate::executor::JobReport;

/// Observer of a run's progress
///
/// Callbacks for different jobs may arrive concurrently; callbacks of one
/// job arrive in order.
pub trait RunReporter: Send + Sync {
    fn run_started(&self, _run: &Run) {}

    fn job_started(&self, _run_id: Uuid, _job: &JobRun) {}

    fn step_started(&self, _run_id: Uuid, _job: &str, _step: &StepRun) {}

    fn step_finished(&self, _run_id: Uuid, _job: &str, _step: &StepRun) {}

    fn job_finished(&self, _run_id: Uuid, _report: &JobReport) {}

    fn run_finished(&self, _run: &Run) {}
}

/// Reporter that ignores everything
pub struct NoopReporter;

impl RunReporter for NoopReporter {}
