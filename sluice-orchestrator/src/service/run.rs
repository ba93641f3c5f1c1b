//! Run Service
//!
//! Starts runs of the configured workflow, tracks them while they execute
//! and cancels them on request.

use sluice_core::domain::event::TriggerEvent;
use sluice_core::domain::log::LogEntry;
use sluice_core::domain::run::Run;
use sluice_core::domain::workflow::Workflow;
use sluice_runner::Scheduler;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::repository::{Cancellation, RunRepository};

/// Service error type
#[derive(Debug)]
pub enum RunError {
    NotFound(Uuid),
    JobNotFound { run_id: Uuid, job: String },
    InvalidState(String),
    ValidationError(String),
}

pub struct RunService {
    workflow: Arc<Workflow>,
    scheduler: Arc<Scheduler>,
    repository: Arc<RunRepository>,
    /// Tasks of runs still executing
    tasks: Arc<Mutex<HashMap<Uuid, AbortHandle>>>,
}

impl RunService {
    /// # Arguments
    /// * `max_runs` - Finished runs kept for inspection
    pub fn new(workflow: Workflow, scheduler: Scheduler, max_runs: usize) -> Self {
        Self {
            workflow: Arc::new(workflow),
            scheduler: Arc::new(scheduler),
            repository: Arc::new(RunRepository::new(max_runs)),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts a run for the event if the workflow reacts to it
    ///
    /// Returns the new run in its initial state, or `None` when the event
    /// does not trigger the workflow. The run continues in the background.
    pub async fn trigger(&self, event: TriggerEvent) -> Result<Option<Run>, RunError> {
        validate_event(&event)?;

        if !self.workflow.is_triggered_by(&event) {
            tracing::info!(
                "Workflow '{}' not triggered by {}",
                self.workflow.name,
                event.describe()
            );
            return Ok(None);
        }

        let run = Run::new(&self.workflow, event);
        let run_id = run.id;
        self.repository.insert(run.clone());

        let workflow = Arc::clone(&self.workflow);
        let scheduler = Arc::clone(&self.scheduler);
        let repository = Arc::clone(&self.repository);
        let tasks = Arc::clone(&self.tasks);

        {
            // Held until the handle is registered so a fast run cannot
            // finish before it is tracked
            let mut running = self.tasks.lock().unwrap();
            let task = tokio::spawn({
                let run = run.clone();
                async move {
                    let outcome = scheduler.execute(run, &workflow, repository).await;
                    tasks.lock().unwrap().remove(&run_id);
                    tracing::info!(
                        "Run {} completed: {} (exit code {})",
                        run_id,
                        outcome.run.status,
                        outcome.exit_code()
                    );
                }
            });
            running.insert(run_id, task.abort_handle());
        }

        tracing::info!("Run {} created for {}", run_id, run.event.describe());

        Ok(Some(run))
    }

    pub async fn list_runs(&self) -> Vec<Run> {
        self.repository.find_all()
    }

    pub async fn get_run(&self, id: Uuid) -> Result<Run, RunError> {
        self.repository.find_by_id(id).ok_or(RunError::NotFound(id))
    }

    /// Log of one job of a run; empty until the job finished
    pub async fn get_job_logs(&self, id: Uuid, job: &str) -> Result<Vec<LogEntry>, RunError> {
        if let Some(entries) = self.repository.find_logs(id, job) {
            return Ok(entries);
        }

        match self.repository.find_by_id(id) {
            Some(_) => Err(RunError::JobNotFound {
                run_id: id,
                job: job.to_string(),
            }),
            None => Err(RunError::NotFound(id)),
        }
    }

    /// Cancels a run that has not finished
    ///
    /// Unfinished jobs become cancelled and their environments are discarded.
    pub async fn cancel_run(&self, id: Uuid) -> Result<Run, RunError> {
        let run = match self.repository.cancel(id) {
            Cancellation::Cancelled(run) => run,
            Cancellation::AlreadyFinished(run) => {
                return Err(RunError::InvalidState(format!(
                    "Run {} already finished with status {}",
                    id, run.status
                )));
            }
            Cancellation::NotFound => return Err(RunError::NotFound(id)),
        };

        if let Some(task) = self.tasks.lock().unwrap().remove(&id) {
            task.abort();
        }

        tracing::info!("Run {} cancelled", id);

        Ok(run)
    }
}

fn validate_event(event: &TriggerEvent) -> Result<(), RunError> {
    let (repository, git_ref) = event.checkout_target();

    if repository.trim().is_empty() {
        return Err(RunError::ValidationError(
            "repository cannot be empty".to_string(),
        ));
    }

    if git_ref.trim().is_empty() {
        return Err(RunError::ValidationError(match event {
            TriggerEvent::PullRequest(_) => "head_sha cannot be empty".to_string(),
            TriggerEvent::Manual(_) => "git_ref cannot be empty".to_string(),
        }));
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sluice_core::domain::event::{ManualEvent, PullRequestAction, PullRequestEvent};
    use sluice_core::domain::job::{JobStatus, StepStatus};
    use sluice_core::domain::workflow::{
        JobDefinition, RunSpec, StepAction, StepDefinition, Trigger,
    };
    use sluice_runner::RunnerConfig;
    use sluice_runner::environment::HostProvider;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn job(name: &str, commands: &[&str]) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            runs_on: "ubuntu-latest".to_string(),
            toolchain: None,
            env: BTreeMap::new(),
            steps: commands
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
        }
    }

    /// Service running `jobs` in throwaway host directories
    pub(crate) fn service(jobs: Vec<JobDefinition>) -> (RunService, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let workflow = Workflow {
            name: "Build and Test".to_string(),
            description: None,
            triggers: vec![Trigger::PullRequest { actions: vec![] }],
            env: BTreeMap::new(),
            jobs,
        };
        let base = dir.path().to_path_buf();
        let scheduler = Scheduler::new(
            RunnerConfig::new(base.clone()),
            Arc::new(HostProvider::new(base)),
        );
        (RunService::new(workflow, scheduler, 100), dir)
    }

    pub(crate) fn two_jobs() -> Vec<JobDefinition> {
        vec![
            job("tinytodo", &["echo building", "exit 101", "echo never"]),
            job("java-hello-world", &["echo gradle", "echo done"]),
        ]
    }

    pub(crate) fn pull_request(action: PullRequestAction) -> PullRequestEvent {
        PullRequestEvent {
            action,
            number: 7,
            repository: "acme/policies".to_string(),
            head_sha: "4b825dc642cb6eb9a060e54bf8d69288fbee4904".to_string(),
            head_ref: "feature/entities".to_string(),
            base_ref: "main".to_string(),
        }
    }

    fn manual() -> TriggerEvent {
        TriggerEvent::Manual(ManualEvent {
            repository: "acme/policies".to_string(),
            git_ref: "main".to_string(),
        })
    }

    pub(crate) async fn wait_until(
        service: &RunService,
        id: Uuid,
        done: impl Fn(&Run) -> bool,
    ) -> Run {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let run = service.get_run(id).await.unwrap();
                if done(&run) {
                    return run;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("run did not reach the expected state")
    }

    #[tokio::test]
    async fn test_failed_job_leaves_other_job_untouched() {
        let (service, _dir) = service(two_jobs());

        let run = service.trigger(manual()).await.unwrap().unwrap();
        assert_eq!(service.list_runs().await.len(), 1);

        let run = wait_until(&service, run.id, |r| r.status.is_terminal()).await;

        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.exit_code(), 101);

        let tinytodo = run.job("tinytodo").unwrap();
        assert_eq!(tinytodo.status, JobStatus::Failed);
        assert_eq!(tinytodo.executed_steps(), vec!["echo building", "exit 101"]);
        assert_eq!(tinytodo.steps[2].status, StepStatus::NotRun);

        let java = run.job("java-hello-world").unwrap();
        assert_eq!(java.status, JobStatus::Succeeded);
        assert_eq!(java.executed_steps(), vec!["echo gradle", "echo done"]);

        let logs = service.get_job_logs(run.id, "java-hello-world").await.unwrap();
        assert!(logs.iter().any(|e| e.message == "gradle"));
        let logs = service.get_job_logs(run.id, "tinytodo").await.unwrap();
        assert!(logs.iter().any(|e| e.message.contains("exit code 101")));
    }

    #[tokio::test]
    async fn test_untriggering_event_creates_no_run() {
        let (service, _dir) = service(two_jobs());

        let outcome = service
            .trigger(TriggerEvent::PullRequest(pull_request(
                PullRequestAction::Closed,
            )))
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert!(service.list_runs().await.is_empty());
    }

    #[tokio::test]
    async fn test_event_without_commit_is_rejected() {
        let (service, _dir) = service(two_jobs());
        let mut event = pull_request(PullRequestAction::Opened);
        event.head_sha = String::new();

        let err = service
            .trigger(TriggerEvent::PullRequest(event))
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::ValidationError(msg) if msg.contains("head_sha")));
    }

    #[tokio::test]
    async fn test_cancel_running_run() {
        let (service, _dir) = service(vec![
            job("slow", &["sleep 30", "echo never"]),
            job("quick", &["echo hi"]),
        ]);

        let run = service.trigger(manual()).await.unwrap().unwrap();
        wait_until(&service, run.id, |r| {
            r.job("slow")
                .is_some_and(|j| j.steps[0].status == StepStatus::Running)
        })
        .await;

        let cancelled = service.cancel_run(run.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        let slow = cancelled.job("slow").unwrap();
        assert_eq!(slow.status, JobStatus::Cancelled);
        assert!(slow.steps.iter().all(|s| s.status == StepStatus::NotRun));

        // Stays cancelled once the aborted tasks have unwound
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stored = service.get_run(run.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert_eq!(stored.exit_code(), 130);

        let err = service.cancel_run(run.id).await.unwrap_err();
        assert!(matches!(err, RunError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_unknown_run_and_job() {
        let (service, _dir) = service(two_jobs());

        let err = service.get_run(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RunError::NotFound(_)));
        let err = service.cancel_run(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RunError::NotFound(_)));

        let run = service.trigger(manual()).await.unwrap().unwrap();
        let err = service.get_job_logs(run.id, "missing").await.unwrap_err();
        assert!(matches!(err, RunError::JobNotFound { job, .. } if job == "missing"));

        wait_until(&service, run.id, |r| r.status.is_terminal()).await;
    }
}
