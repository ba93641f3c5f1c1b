//! Run command handlers
//!
//! Triggers and inspects runs on a remote orchestrator.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use sluice_client::OrchestratorClient;
use sluice_core::domain::event::{ManualEvent, PullRequestAction, PullRequestEvent, TriggerEvent};

use crate::config::Config;
use crate::id_resolver::resolve_run_id;
use crate::output::{print_logs, print_run_details, print_run_summary};

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Start a run on the orchestrator
    Trigger {
        /// Repository to build (`owner/name` or clone URL)
        #[arg(long)]
        repo: String,

        /// Ref or commit to build
        #[arg(long = "ref", default_value = "main")]
        git_ref: String,

        /// Deliver a pull-request event with this number instead of a manual run
        #[arg(long)]
        pull_request: Option<u64>,

        /// Pull-request action
        #[arg(long, default_value = "opened", requires = "pull_request")]
        action: PullRequestAction,

        /// Pull-request base branch
        #[arg(long, default_value = "main", requires = "pull_request")]
        base: String,
    },
    /// List all runs
    List,
    /// Get run details
    Get {
        /// Run ID or unambiguous prefix
        id: String,

        /// Print the raw JSON record
        #[arg(long)]
        json: bool,
    },
    /// Get the log of a job
    Logs {
        /// Run ID or unambiguous prefix
        id: String,

        /// Job name
        job: String,
    },
    /// Cancel a run that has not finished
    Cancel {
        /// Run ID or unambiguous prefix
        id: String,
    },
}

/// Handle run commands
pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        RunCommands::Trigger {
            repo,
            git_ref,
            pull_request,
            action,
            base,
        } => {
            let event = match pull_request {
                Some(number) => TriggerEvent::PullRequest(PullRequestEvent {
                    action,
                    number,
                    repository: repo,
                    head_sha: git_ref.clone(),
                    head_ref: git_ref,
                    base_ref: base,
                }),
                None => TriggerEvent::Manual(ManualEvent {
                    repository: repo,
                    git_ref,
                }),
            };
            trigger_run(&client, event).await
        }
        RunCommands::List => list_runs(&client).await,
        RunCommands::Get { id, json } => get_run(&client, &id, json).await,
        RunCommands::Logs { id, job } => get_job_logs(&client, &id, &job).await,
        RunCommands::Cancel { id } => cancel_run(&client, &id).await,
    }
}

async fn trigger_run(client: &OrchestratorClient, event: TriggerEvent) -> Result<()> {
    let description = event.describe();
    let outcome = match event {
        TriggerEvent::PullRequest(pr) => client.send_pull_request_event(&pr).await,
        manual => client.trigger_run(manual).await,
    }
    .with_context(|| format!("Failed to trigger run for {}", description))?;

    match outcome.run {
        Some(run) => {
            println!("{}", "✓ Run started".green().bold());
            println!();
            print_run_summary(&run);
            println!(
                "Follow it with {}",
                format!("sluice run get {}", &run.id.to_string()[..8]).cyan()
            );
        }
        None => {
            println!(
                "{}",
                format!("Workflow not triggered by {}", description).yellow()
            );
        }
    }

    Ok(())
}

async fn list_runs(client: &OrchestratorClient) -> Result<()> {
    let runs = client.list_runs().await?;

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
    } else {
        println!("{}", format!("Found {} run(s):", runs.len()).bold());
        println!();
        for run in &runs {
            print_run_summary(run);
        }
    }

    Ok(())
}

async fn get_run(client: &OrchestratorClient, id: &str, json: bool) -> Result<()> {
    let uuid = resolve_run_id(client, id).await?;
    let run = client.get_run(uuid).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run_details(&run);
    }

    Ok(())
}

async fn get_job_logs(client: &OrchestratorClient, id: &str, job: &str) -> Result<()> {
    let uuid = resolve_run_id(client, id).await?;
    let logs = client.get_job_logs(uuid, job).await?;

    if logs.entries.is_empty() {
        println!(
            "{}",
            format!("No logs yet for job '{}' (logs are stored when the job finishes).", job)
                .yellow()
        );
    } else {
        print_logs(&format!("Logs for job '{}' of run {}:", job, uuid), &logs.entries);
    }

    Ok(())
}

async fn cancel_run(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_run_id(client, id).await?;
    let run = client.cancel_run(uuid).await?;

    println!("{}", format!("✓ Run {} cancelled", run.id).green());
    Ok(())
}
