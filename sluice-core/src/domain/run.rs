//! Run domain types
//!
//! A run is one execution of a workflow in response to a trigger event.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::event::TriggerEvent;
use crate::domain::job::{JobRun, JobStatus};
use crate::domain::workflow::Workflow;

/// Workflow run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub workflow: String,
    pub event: TriggerEvent,
    pub status: JobStatus,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// One record per job, in declaration order
    pub jobs: Vec<JobRun>,
}

impl Run {
    /// New pending run with a pending record for every job
    pub fn new(workflow: &Workflow, event: TriggerEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow: workflow.name.clone(),
            event,
            status: JobStatus::Pending,
            requested_at: chrono::Utc::now(),
            completed_at: None,
            jobs: workflow.jobs.iter().map(JobRun::pending).collect(),
        }
    }

    pub fn job(&self, name: &str) -> Option<&JobRun> {
        self.jobs.iter().find(|job| job.name == name)
    }

    pub fn job_mut(&mut self, name: &str) -> Option<&mut JobRun> {
        self.jobs.iter_mut().find(|job| job.name == name)
    }

    /// Status derived from the job records
    ///
    /// Running while any job is not terminal; afterwards Failed if any job
    /// failed, Cancelled if any was cancelled, Succeeded otherwise.
    pub fn aggregate_status(&self) -> JobStatus {
        if self.jobs.iter().any(|job| !job.status.is_terminal()) {
            if self.jobs.iter().all(|job| job.status == JobStatus::Pending) {
                return JobStatus::Pending;
            }
            return JobStatus::Running;
        }

        if self.jobs.iter().any(|job| job.status == JobStatus::Failed) {
            JobStatus::Failed
        } else if self.jobs.iter().any(|job| job.status == JobStatus::Cancelled) {
            JobStatus::Cancelled
        } else {
            JobStatus::Succeeded
        }
    }

    /// 0 when every job succeeded, else the code of the first failed job
    pub fn exit_code(&self) -> i32 {
        if let Some(code) = self
            .jobs
            .iter()
            .map(JobRun::exit_code)
            .find(|code| *code != 0)
        {
            return code;
        }

        match self.aggregate_status() {
            JobStatus::Succeeded => 0,
            JobStatus::Cancelled => 130,
            _ => 1,
        }
    }

    /// Records completion once every job is terminal
    pub fn finish(&mut self) {
        self.status = self.aggregate_status();
        if self.status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(chrono::Utc::now());
        }
    }

    /// Cancels every unfinished job and the run itself
    pub fn cancel(&mut self) {
        for job in &mut self.jobs {
            job.cancel();
        }
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::ManualEvent;
    use crate::domain::job::JobResult;
    use crate::domain::workflow::{JobDefinition, RunSpec, StepAction, StepDefinition};
    use std::collections::BTreeMap;

    fn workflow(names: &[&str]) -> Workflow {
        Workflow {
            name: "CI".to_string(),
            description: None,
            triggers: vec![],
            env: BTreeMap::new(),
            jobs: names
                .iter()
                .map(|name| JobDefinition {
                    name: name.to_string(),
                    runs_on: "ubuntu-latest".to_string(),
                    toolchain: None,
                    env: BTreeMap::new(),
                    steps: vec![StepDefinition {
                        name: "test".to_string(),
                        working_directory: None,
                        env: BTreeMap::new(),
                        action: StepAction::Run(RunSpec {
                            command: "true".to_string(),
                            shell: None,
                        }),
                    }],
                })
                .collect(),
        }
    }

    fn manual() -> TriggerEvent {
        TriggerEvent::Manual(ManualEvent {
            repository: ".".to_string(),
            git_ref: "HEAD".to_string(),
        })
    }

    fn complete(run: &mut Run, name: &str, result: JobResult) {
        let job = run.job_mut(name).unwrap();
        job.status = if result.success {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };
        job.result = Some(result);
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = Run::new(&workflow(&["a", "b"]), manual());
        assert_eq!(run.status, JobStatus::Pending);
        assert_eq!(run.aggregate_status(), JobStatus::Pending);
        assert_eq!(run.jobs.len(), 2);
    }

    #[test]
    fn test_all_jobs_succeeded() {
        let mut run = Run::new(&workflow(&["a", "b"]), manual());
        complete(&mut run, "a", JobResult::success());
        complete(&mut run, "b", JobResult::success());
        run.finish();
        assert_eq!(run.status, JobStatus::Succeeded);
        assert_eq!(run.exit_code(), 0);
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn test_exit_code_is_first_failure_in_declaration_order() {
        let mut run = Run::new(&workflow(&["a", "b", "c"]), manual());
        complete(&mut run, "a", JobResult::success());
        let mut second = JobResult::success();
        second.success = false;
        second.exit_code = 101;
        complete(&mut run, "b", second);
        let mut third = JobResult::success();
        third.success = false;
        third.exit_code = 2;
        complete(&mut run, "c", third);
        run.finish();

        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.exit_code(), 101);
    }

    #[test]
    fn test_running_while_jobs_outstanding() {
        let mut run = Run::new(&workflow(&["a", "b"]), manual());
        complete(&mut run, "a", JobResult::success());
        run.finish();
        assert_eq!(run.status, JobStatus::Running);
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn test_cancel_keeps_finished_jobs() {
        let mut run = Run::new(&workflow(&["a", "b"]), manual());
        complete(&mut run, "a", JobResult::success());
        run.cancel();
        assert_eq!(run.job("a").unwrap().status, JobStatus::Succeeded);
        assert_eq!(run.job("b").unwrap().status, JobStatus::Cancelled);
        assert_eq!(run.status, JobStatus::Cancelled);
        assert_ne!(run.exit_code(), 0);
    }
}
