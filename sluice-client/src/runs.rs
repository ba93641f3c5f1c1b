//! Run and event endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use sluice_core::domain::event::{PullRequestEvent, TriggerEvent};
use sluice_core::domain::run::Run;
use sluice_core::dto::run::{EventOutcome, JobLogs, RunSummary, TriggerRun};
use uuid::Uuid;

impl OrchestratorClient {
    /// Check that the orchestrator is up
    pub async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;

        self.handle_empty_response(response).await
    }

    /// Start a run for a manual or pull-request event
    ///
    /// # Returns
    /// The outcome; `run` is `None` when the workflow does not react to the event
    pub async fn trigger_run(&self, event: TriggerEvent) -> Result<EventOutcome> {
        let response = self
            .client
            .post(self.url("/api/runs"))
            .json(&TriggerRun { event })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Deliver a pull-request event the way the hosting platform's webhook does
    pub async fn send_pull_request_event(&self, event: &PullRequestEvent) -> Result<EventOutcome> {
        let response = self
            .client
            .post(self.url("/api/events/pull_request"))
            .json(event)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List all runs, newest first
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let response = self.client.get(self.url("/api/runs")).send().await?;

        self.handle_response(response).await
    }

    /// Get a run with the status of every job and step
    pub async fn get_run(&self, run_id: Uuid) -> Result<Run> {
        let url = self.url(&format!("/api/runs/{}", run_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the log of one job of a run
    pub async fn get_job_logs(&self, run_id: Uuid, job: &str) -> Result<JobLogs> {
        let url = self.url(&format!("/api/runs/{}/jobs/{}/logs", run_id, job));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Cancel a run that has not finished
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<Run> {
        let url = self.url(&format!("/api/runs/{}/cancel", run_id));
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }
}
