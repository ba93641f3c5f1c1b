//! Run scheduler
//!
//! Starts every job of a workflow as its own task and waits until all of
//! them reached a terminal state. Jobs share nothing: each builds its own
//! context and acquires its own environment, so one job's failure cannot
//! change what another job runs or how it ends.

use sluice_core::domain::event::TriggerEvent;
use sluice_core::domain::job::{JobResult, JobRun, JobStatus, StepStatus};
use sluice_core::domain::log::LogEntry;
use sluice_core::domain::run::Run;
use sluice_core::domain::workflow::Workflow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::RunnerConfig;
use crate::environment::{EnvironmentProvider, provider_for};
use crate::executor::JobExecutor;
use crate::reporter::RunReporter;

/// Finished run with the log of every job, keyed by job name
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: Run,
    pub logs: BTreeMap<String, Vec<LogEntry>>,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        self.run.exit_code()
    }
}

/// Executes whole runs
pub struct Scheduler {
    executor: Arc<JobExecutor>,
    max_parallel_jobs: usize,
}

impl Scheduler {
    pub fn new(config: RunnerConfig, provider: Arc<dyn EnvironmentProvider>) -> Self {
        let max_parallel_jobs = config.max_parallel_jobs.max(1);
        Self {
            executor: Arc::new(JobExecutor::new(Arc::new(config), provider)),
            max_parallel_jobs,
        }
    }

    /// Scheduler using the isolation backend named by the configuration
    pub fn from_config(config: RunnerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let provider = provider_for(&config);
        Ok(Self::new(config, provider))
    }

    /// Runs every job of `workflow` for `event`
    pub async fn run(
        &self,
        workflow: &Workflow,
        event: TriggerEvent,
        reporter: Arc<dyn RunReporter>,
    ) -> RunOutcome {
        self.execute(Run::new(workflow, event), workflow, reporter)
            .await
    }

    /// Executes a run record created by the caller
    ///
    /// Dropping the returned future aborts every job task; their
    /// environments are discarded as the tasks unwind.
    pub async fn execute(
        &self,
        mut run: Run,
        workflow: &Workflow,
        reporter: Arc<dyn RunReporter>,
    ) -> RunOutcome {
        info!(
            "Starting run {} of '{}' with {} job(s) for {}",
            run.id,
            run.workflow,
            workflow.jobs.len(),
            run.event.describe()
        );

        run.status = JobStatus::Running;
        reporter.run_started(&run);

        let semaphore = Arc::new(Semaphore::new(self.max_parallel_jobs));
        let mut tasks = JoinSet::new();

        for (index, job) in workflow.jobs.iter().cloned().enumerate() {
            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&semaphore);
            let reporter = Arc::clone(&reporter);
            let workflow_env = workflow.env.clone();
            let event = run.event.clone();
            let run_id = run.id;

            tasks.spawn(async move {
                // Permit is released when the job's future completes or is dropped
                let _permit = semaphore.acquire_owned().await;
                let report = executor
                    .execute(run_id, &job, &workflow_env, &event, reporter.as_ref())
                    .await;
                (index, report)
            });
        }

        let mut logs = BTreeMap::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => {
                    logs.insert(report.run.name.clone(), report.logs);
                    run.jobs[index] = report.run;
                }
                Err(e) => {
                    error!("Job task of run {} failed: {}", run.id, e);
                }
            }
        }

        for job in &mut run.jobs {
            if !job.status.is_terminal() {
                abandon(job, "job task ended without reporting a result");
            }
        }

        run.finish();
        info!(
            "Run {} finished: {} (exit code {})",
            run.id,
            run.status,
            run.exit_code()
        );
        reporter.run_finished(&run);

        RunOutcome { run, logs }
    }
}

/// Marks a job whose task died as failed
fn abandon(job: &mut JobRun, reason: &str) {
    if job.status == JobStatus::Pending {
        job.status = JobStatus::Running;
    }
    job.status = JobStatus::Failed;
    job.completed_at = Some(chrono::Utc::now());
    for step in &mut job.steps {
        if matches!(step.status, StepStatus::Pending | StepStatus::Running) {
            step.status = StepStatus::NotRun;
        }
    }
    job.result = Some(JobResult {
        success: false,
        exit_code: 1,
        failed_step: None,
        error_message: Some(reason.to_string()),
    });
}
