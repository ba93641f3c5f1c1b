//! Job executor
//!
//! Runs the steps of one job strictly in declaration order inside a clean
//! environment acquired for that job alone. The first failing step ends the
//! job: later steps are never started and nothing already done is undone.
//! The environment is discarded when the job ends, whatever the outcome.

use sluice_core::domain::event::TriggerEvent;
use sluice_core::domain::job::{JobResult, JobRun, JobStatus, StepStatus};
use sluice_core::domain::log::LogEntry;
use sluice_core::domain::workflow::JobDefinition;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RunnerConfig;
use crate::context::JobContext;
use crate::environment::EnvironmentProvider;
use crate::reporter::RunReporter;
use crate::steps;

/// Outcome of one job: its final record and everything it logged
#[derive(Debug, Clone)]
pub struct JobReport {
    pub run: JobRun,
    pub logs: Vec<LogEntry>,
}

/// Executes single jobs
pub struct JobExecutor {
    config: Arc<RunnerConfig>,
    provider: Arc<dyn EnvironmentProvider>,
}

impl JobExecutor {
    pub fn new(config: Arc<RunnerConfig>, provider: Arc<dyn EnvironmentProvider>) -> Self {
        Self { config, provider }
    }

    /// Executes a job to a terminal state
    ///
    /// # Arguments
    /// * `run_id` - Run the job belongs to
    /// * `job` - Job definition
    /// * `workflow_env` - Variables declared at workflow level
    /// * `event` - Event that started the run
    /// * `reporter` - Receives job and step progress
    pub async fn execute(
        &self,
        run_id: Uuid,
        job: &JobDefinition,
        workflow_env: &BTreeMap<String, String>,
        event: &TriggerEvent,
        reporter: &dyn RunReporter,
    ) -> JobReport {
        let mut record = JobRun::pending(job);
        advance(&mut record, JobStatus::Running);
        record.started_at = Some(chrono::Utc::now());
        reporter.job_started(run_id, &record);

        let context = JobContext::new(&job.name, job_env(run_id, job, workflow_env, event));
        context.log_info(format!("Job '{}' started for {}", job.name, event.describe()));
        info!("Starting job '{}' of run {} on {}", job.name, run_id, job.runs_on);

        let environment = match self.provider.acquire(Uuid::new_v4(), &job.runs_on).await {
            Ok(environment) => environment,
            Err(e) => {
                error!("Job '{}' could not start: {}", job.name, e);
                context.log_error(e.to_string());
                for step in &mut record.steps {
                    step.status = StepStatus::NotRun;
                }
                record.result = Some(JobResult::failed(&e));
                return self.finish(run_id, record, &context, reporter);
            }
        };

        context.log_info(format!("Running in {}", environment.describe()));

        let mut failure = None;

        for (idx, step) in job.steps.iter().enumerate() {
            if failure.is_some() {
                record.steps[idx].status = StepStatus::NotRun;
                continue;
            }

            debug!(
                "Executing step {}/{} of job '{}': {}",
                idx + 1,
                job.steps.len(),
                job.name,
                step.name
            );
            context.log_info(format!("Starting step: {}", step.name));
            record.steps[idx].status = StepStatus::Running;
            reporter.step_started(run_id, &job.name, &record.steps[idx]);

            let outcome = steps::execute_step(
                environment.as_ref(),
                &context,
                &self.config,
                job,
                step,
                event,
            )
            .await;

            match outcome {
                Ok(()) => {
                    record.steps[idx].status = StepStatus::Succeeded;
                    record.steps[idx].exit_code = Some(0);
                    context.log_info(format!("Step '{}' completed", step.name));
                }
                Err(e) => {
                    warn!("Step '{}' of job '{}' failed: {}", step.name, job.name, e);
                    context.log_error(format!("Step '{}' failed: {}", step.name, e));
                    record.steps[idx].status = StepStatus::Failed;
                    record.steps[idx].exit_code = Some(e.exit_code());
                    failure = Some(JobResult::step_failed(&step.name, &e));
                }
            }

            reporter.step_finished(run_id, &job.name, &record.steps[idx]);
        }

        drop(environment);
        context.log_debug("Environment discarded".to_string());

        record.result = Some(failure.unwrap_or_else(JobResult::success));
        self.finish(run_id, record, &context, reporter)
    }

    fn finish(
        &self,
        run_id: Uuid,
        mut record: JobRun,
        context: &JobContext,
        reporter: &dyn RunReporter,
    ) -> JobReport {
        let success = record.result.as_ref().is_some_and(|r| r.success);
        advance(
            &mut record,
            if success {
                JobStatus::Succeeded
            } else {
                JobStatus::Failed
            },
        );
        record.completed_at = Some(chrono::Utc::now());

        if success {
            context.log_info(format!("Job '{}' succeeded", record.name));
        } else {
            context.log_error(format!(
                "Job '{}' failed with exit code {}",
                record.name,
                record.exit_code()
            ));
        }
        info!(
            "Job '{}' of run {} finished: {}",
            record.name, run_id, record.status
        );

        let report = JobReport {
            run: record,
            logs: context.drain_logs(),
        };
        reporter.job_finished(run_id, &report);
        report
    }
}

fn advance(record: &mut JobRun, next: JobStatus) {
    if let Err(e) = record.status.transition(next) {
        warn!("Job '{}': {}", record.name, e);
    }
}

/// Variables every process of the job sees
///
/// Workflow env, then job env, then the run's own `SLUICE_*` variables.
fn job_env(
    run_id: Uuid,
    job: &JobDefinition,
    workflow_env: &BTreeMap<String, String>,
    event: &TriggerEvent,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("CI".to_string(), "true".to_string());
    env.extend(workflow_env.clone());
    env.extend(job.env.clone());

    let (repository, git_ref) = event.checkout_target();
    env.insert("SLUICE".to_string(), "true".to_string());
    env.insert("SLUICE_RUN_ID".to_string(), run_id.to_string());
    env.insert("SLUICE_JOB".to_string(), job.name.clone());
    env.insert("SLUICE_REPOSITORY".to_string(), repository.to_string());
    env.insert("SLUICE_REF".to_string(), git_ref.to_string());

    match event {
        TriggerEvent::PullRequest(pr) => {
            env.insert("SLUICE_EVENT".to_string(), "pull_request".to_string());
            env.insert("SLUICE_PR_NUMBER".to_string(), pr.number.to_string());
            env.insert("SLUICE_HEAD_REF".to_string(), pr.head_ref.clone());
            env.insert("SLUICE_BASE_REF".to_string(), pr.base_ref.clone());
        }
        TriggerEvent::Manual(_) => {
            env.insert("SLUICE_EVENT".to_string(), "manual".to_string());
        }
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::NoopReporter;
    use crate::testing::ScriptedProvider;
    use sluice_core::domain::event::ManualEvent;
    use sluice_core::domain::workflow::{RunSpec, StepAction, StepDefinition};

    fn run_step(command: &str) -> StepDefinition {
        StepDefinition {
            name: command.to_string(),
            working_directory: None,
            env: BTreeMap::new(),
            action: StepAction::Run(RunSpec {
                command: command.to_string(),
                shell: None,
            }),
        }
    }

    fn job(name: &str, commands: &[&str]) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            runs_on: "ubuntu-latest".to_string(),
            toolchain: None,
            env: BTreeMap::from([("JOB_LEVEL".to_string(), "1".to_string())]),
            steps: commands.iter().map(|c| run_step(c)).collect(),
        }
    }

    fn manual() -> TriggerEvent {
        TriggerEvent::Manual(ManualEvent {
            repository: "acme/app".to_string(),
            git_ref: "main".to_string(),
        })
    }

    async fn execute(provider: &ScriptedProvider, job: &JobDefinition) -> JobReport {
        let executor = JobExecutor::new(
            Arc::new(RunnerConfig::default()),
            Arc::new(provider.clone()),
        );
        executor
            .execute(Uuid::new_v4(), job, &BTreeMap::new(), &manual(), &NoopReporter)
            .await
    }

    #[tokio::test]
    async fn test_steps_run_in_declared_order() {
        let provider = ScriptedProvider::new();
        let job = job("build", &["first", "second", "third"]);

        let report = execute(&provider, &job).await;

        assert_eq!(report.run.status, JobStatus::Succeeded);
        assert_eq!(report.run.exit_code(), 0);
        assert_eq!(provider.commands("build"), vec!["first", "second", "third"]);
        assert_eq!(report.run.executed_steps(), vec!["first", "second", "third"]);
        assert!(report.run.started_at.is_some());
        assert!(report.run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_job() {
        let provider = ScriptedProvider::new().fail_command("second", 3);
        let job = job("build", &["first", "second", "third"]);

        let report = execute(&provider, &job).await;

        assert_eq!(report.run.status, JobStatus::Failed);
        assert_eq!(report.run.exit_code(), 3);
        assert_eq!(provider.commands("build"), vec!["first", "second"]);
        assert_eq!(report.run.steps[2].status, StepStatus::NotRun);
        assert_eq!(report.run.steps[1].exit_code, Some(3));

        let result = report.run.result.as_ref().unwrap();
        assert_eq!(result.failed_step.as_deref(), Some("second"));
        assert!(report
            .logs
            .iter()
            .any(|e| e.message.contains("exit code 3")));
    }

    #[tokio::test]
    async fn test_unavailable_environment_fails_before_any_step() {
        let provider = ScriptedProvider::new().unavailable("ubuntu-latest");
        let job = job("build", &["first"]);

        let report = execute(&provider, &job).await;

        assert_eq!(report.run.status, JobStatus::Failed);
        assert!(provider.history().is_empty());
        assert_eq!(report.run.steps[0].status, StepStatus::NotRun);
        let result = report.run.result.unwrap();
        assert_eq!(result.failed_step, None);
        assert!(result.error_message.unwrap().contains("ubuntu-latest"));
    }

    #[tokio::test]
    async fn test_environment_discarded_in_every_case() {
        let provider = ScriptedProvider::new().fail_command("boom", 1);

        execute(&provider, &job("ok", &["fine"])).await;
        execute(&provider, &job("broken", &["boom", "never"])).await;

        assert_eq!(provider.live_environments(), 0);
    }

    #[tokio::test]
    async fn test_environment_acquired_for_job_platform() {
        let provider = ScriptedProvider::new();
        let mut job = job("java", &["java -version"]);
        job.runs_on = "fedora-40".to_string();

        execute(&provider, &job).await;

        let history = provider.history();
        assert!(!history.is_empty());
        assert!(history
            .iter()
            .all(|exec| exec.job == "java" && exec.platform == "fedora-40"));
    }

    #[tokio::test]
    async fn test_job_environment_variables() {
        let provider = ScriptedProvider::new();
        let job = job("build", &["env"]);

        execute(&provider, &job).await;

        let env = &provider.history()[0].request.env;
        assert_eq!(env["CI"], "true");
        assert_eq!(env["JOB_LEVEL"], "1");
        assert_eq!(env["SLUICE_JOB"], "build");
        assert_eq!(env["SLUICE_EVENT"], "manual");
        assert_eq!(env["SLUICE_REPOSITORY"], "acme/app");
    }
}
