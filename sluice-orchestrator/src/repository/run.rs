//! Run Repository
//!
//! In-memory store of every run the orchestrator started, kept current by
//! the scheduler's progress callbacks.

use sluice_core::domain::job::{JobRun, StepRun, StepStatus};
use sluice_core::domain::log::LogEntry;
use sluice_core::domain::run::Run;
use sluice_runner::{JobReport, RunReporter};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

struct StoredRun {
    run: Run,
    logs: HashMap<String, Vec<LogEntry>>,
}

/// Result of a cancellation request
#[derive(Debug)]
pub enum Cancellation {
    Cancelled(Run),
    /// The run reached a final state first; carries that state
    AlreadyFinished(Run),
    NotFound,
}

pub struct RunRepository {
    runs: RwLock<HashMap<Uuid, StoredRun>>,
    /// Finished runs beyond this count are forgotten, oldest first
    max_runs: usize,
}

impl RunRepository {
    pub fn new(max_runs: usize) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            max_runs,
        }
    }

    /// Stores a newly created run, evicting the oldest finished runs when
    /// the store is over capacity
    pub fn insert(&self, run: Run) {
        let mut runs = self.runs.write().unwrap();
        runs.insert(
            run.id,
            StoredRun {
                run,
                logs: HashMap::new(),
            },
        );

        if runs.len() <= self.max_runs {
            return;
        }

        let mut finished: Vec<(chrono::DateTime<chrono::Utc>, Uuid)> = runs
            .values()
            .filter(|stored| stored.run.status.is_terminal())
            .map(|stored| (stored.run.requested_at, stored.run.id))
            .collect();
        finished.sort();

        let excess = runs.len() - self.max_runs;
        for (_, id) in finished.into_iter().take(excess) {
            runs.remove(&id);
            tracing::debug!("Evicted finished run {}", id);
        }
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<Run> {
        let runs = self.runs.read().unwrap();
        runs.get(&id).map(|stored| stored.run.clone())
    }

    /// All runs, newest first
    pub fn find_all(&self) -> Vec<Run> {
        let runs = self.runs.read().unwrap();
        let mut all: Vec<Run> = runs.values().map(|stored| stored.run.clone()).collect();
        all.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        all
    }

    /// Log of one job
    ///
    /// `None` when the run or the job does not exist; empty while the job
    /// has not finished yet.
    pub fn find_logs(&self, id: Uuid, job: &str) -> Option<Vec<LogEntry>> {
        let runs = self.runs.read().unwrap();
        let stored = runs.get(&id)?;
        stored.run.job(job)?;
        Some(stored.logs.get(job).cloned().unwrap_or_default())
    }

    /// Cancels a run that has not finished
    ///
    /// The check and the cancellation happen under one lock, so a run that
    /// completes concurrently is reported as finished rather than cancelled.
    pub fn cancel(&self, id: Uuid) -> Cancellation {
        let mut runs = self.runs.write().unwrap();
        let Some(stored) = runs.get_mut(&id) else {
            return Cancellation::NotFound;
        };
        if stored.run.status.is_terminal() {
            return Cancellation::AlreadyFinished(stored.run.clone());
        }
        stored.run.cancel();
        Cancellation::Cancelled(stored.run.clone())
    }

    /// Applies a progress update unless the run already reached a final state
    ///
    /// Jobs of a cancelled run may still report while their tasks unwind.
    fn update(&self, id: Uuid, apply: impl FnOnce(&mut StoredRun)) {
        let mut runs = self.runs.write().unwrap();
        match runs.get_mut(&id) {
            Some(stored) if !stored.run.status.is_terminal() => apply(stored),
            Some(_) => tracing::debug!("Ignoring update for finished run {}", id),
            None => tracing::warn!("Update for unknown run {}", id),
        }
    }

    fn update_step(&self, id: Uuid, job: &str, step: &StepRun, from: StepStatus) {
        self.update(id, |stored| {
            if let Some(record) = stored.run.job_mut(job).and_then(|job| {
                job.steps
                    .iter_mut()
                    .find(|s| s.name == step.name && s.status == from)
            }) {
                *record = step.clone();
            }
        });
    }
}

impl RunReporter for RunRepository {
    fn run_started(&self, run: &Run) {
        self.update(run.id, |stored| stored.run.status = run.status);
    }

    fn job_started(&self, run_id: Uuid, job: &JobRun) {
        self.update(run_id, |stored| {
            if let Some(record) = stored.run.job_mut(&job.name) {
                *record = job.clone();
            }
        });
    }

    fn step_started(&self, run_id: Uuid, job: &str, step: &StepRun) {
        self.update_step(run_id, job, step, StepStatus::Pending);
    }

    fn step_finished(&self, run_id: Uuid, job: &str, step: &StepRun) {
        self.update_step(run_id, job, step, StepStatus::Running);
    }

    fn job_finished(&self, run_id: Uuid, report: &JobReport) {
        self.update(run_id, |stored| {
            if let Some(record) = stored.run.job_mut(&report.run.name) {
                *record = report.run.clone();
            }
            stored
                .logs
                .insert(report.run.name.clone(), report.logs.clone());
        });
    }

    fn run_finished(&self, run: &Run) {
        self.update(run.id, |stored| stored.run = run.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::domain::event::{ManualEvent, TriggerEvent};
    use sluice_core::domain::job::{JobResult, JobStatus};
    use sluice_core::domain::log::LogLevel;
    use sluice_core::domain::workflow::{
        JobDefinition, RunSpec, StepAction, StepDefinition, Workflow,
    };
    use std::collections::BTreeMap;

    fn workflow() -> Workflow {
        let job = |name: &str| JobDefinition {
            name: name.to_string(),
            runs_on: "ubuntu-latest".to_string(),
            toolchain: None,
            env: BTreeMap::new(),
            steps: ["cargo build", "cargo test"]
                .iter()
                .map(|command| StepDefinition {
                    name: command.to_string(),
                    working_directory: None,
                    env: BTreeMap::new(),
                    action: StepAction::Run(RunSpec {
                        command: command.to_string(),
                        shell: None,
                    }),
                })
                .collect(),
        };
        Workflow {
            name: "CI".to_string(),
            description: None,
            triggers: vec![],
            env: BTreeMap::new(),
            jobs: vec![job("tinytodo"), job("rust-hello-world")],
        }
    }

    fn new_run() -> Run {
        Run::new(
            &workflow(),
            TriggerEvent::Manual(ManualEvent {
                repository: ".".to_string(),
                git_ref: "HEAD".to_string(),
            }),
        )
    }

    #[test]
    fn test_insert_and_find() {
        let repository = RunRepository::new(10);
        let run = new_run();
        let id = run.id;
        repository.insert(run);

        assert_eq!(repository.find_by_id(id).unwrap().id, id);
        assert!(repository.find_by_id(Uuid::new_v4()).is_none());
        assert_eq!(repository.find_all().len(), 1);
    }

    #[test]
    fn test_progress_is_visible_while_running() {
        let repository = RunRepository::new(10);
        let mut run = new_run();
        let id = run.id;
        repository.insert(run.clone());

        run.status = JobStatus::Running;
        repository.run_started(&run);

        let mut job = run.jobs[0].clone();
        job.status = JobStatus::Running;
        repository.job_started(id, &job);

        job.steps[0].status = StepStatus::Running;
        repository.step_started(id, "tinytodo", &job.steps[0]);

        let stored = repository.find_by_id(id).unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        let tinytodo = stored.job("tinytodo").unwrap();
        assert_eq!(tinytodo.status, JobStatus::Running);
        assert_eq!(tinytodo.steps[0].status, StepStatus::Running);
        assert_eq!(tinytodo.steps[1].status, StepStatus::Pending);
        assert_eq!(
            stored.job("rust-hello-world").unwrap().status,
            JobStatus::Pending
        );
        assert!(repository.find_logs(id, "tinytodo").unwrap().is_empty());
    }

    #[test]
    fn test_logs_stored_when_job_finishes() {
        let repository = RunRepository::new(10);
        let run = new_run();
        let id = run.id;
        repository.insert(run.clone());

        let mut job = run.jobs[0].clone();
        job.status = JobStatus::Succeeded;
        job.result = Some(JobResult::success());
        repository.job_finished(
            id,
            &JobReport {
                run: job,
                logs: vec![LogEntry::now(LogLevel::Info, "Job 'tinytodo' succeeded")],
            },
        );

        let logs = repository.find_logs(id, "tinytodo").unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "Job 'tinytodo' succeeded");
        assert!(repository.find_logs(id, "missing").is_none());
        assert!(repository.find_logs(Uuid::new_v4(), "tinytodo").is_none());
    }

    #[test]
    fn test_cancelled_run_ignores_late_updates() {
        let repository = RunRepository::new(10);
        let run = new_run();
        let id = run.id;
        repository.insert(run.clone());

        let Cancellation::Cancelled(cancelled) = repository.cancel(id) else {
            panic!("run should have been cancelled");
        };
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());

        let mut job = run.jobs[0].clone();
        job.status = JobStatus::Failed;
        repository.job_finished(id, &JobReport { run: job, logs: vec![] });

        let stored = repository.find_by_id(id).unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert_eq!(stored.job("tinytodo").unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_cancel_finished_run_reports_final_state() {
        let repository = RunRepository::new(10);
        let mut run = new_run();
        let id = run.id;
        repository.insert(run.clone());

        run.status = JobStatus::Succeeded;
        repository.run_finished(&run);

        match repository.cancel(id) {
            Cancellation::AlreadyFinished(stored) => {
                assert_eq!(stored.status, JobStatus::Succeeded)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            repository.cancel(Uuid::new_v4()),
            Cancellation::NotFound
        ));
    }

    #[test]
    fn test_oldest_finished_runs_evicted_over_capacity() {
        let repository = RunRepository::new(3);
        let start = chrono::Utc::now();

        let mut running = new_run();
        running.requested_at = start;
        let running_id = running.id;
        repository.insert(running);

        let mut finished_ids = Vec::new();
        for offset in 1..=3 {
            let mut run = new_run();
            run.requested_at = start + chrono::Duration::seconds(offset);
            finished_ids.push(run.id);
            repository.insert(run.clone());
            run.status = JobStatus::Failed;
            repository.run_finished(&run);
        }

        assert_eq!(repository.find_all().len(), 3);
        assert!(repository.find_by_id(running_id).is_some());
        assert!(repository.find_by_id(finished_ids[0]).is_none());
        assert!(repository.find_by_id(finished_ids[1]).is_some());
        assert!(repository.find_by_id(finished_ids[2]).is_some());
    }

    #[test]
    fn test_running_runs_never_evicted() {
        let repository = RunRepository::new(1);
        let first = new_run();
        let second = new_run();
        let (first_id, second_id) = (first.id, second.id);
        repository.insert(first);
        repository.insert(second);

        assert!(repository.find_by_id(first_id).is_some());
        assert!(repository.find_by_id(second_id).is_some());
    }

    #[test]
    fn test_find_all_newest_first() {
        let repository = RunRepository::new(10);
        let older = new_run();
        let mut newer = new_run();
        newer.requested_at = older.requested_at + chrono::Duration::seconds(5);
        let (older_id, newer_id) = (older.id, newer.id);
        repository.insert(older);
        repository.insert(newer);

        let ids: Vec<Uuid> = repository.find_all().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newer_id, older_id]);
    }
}
