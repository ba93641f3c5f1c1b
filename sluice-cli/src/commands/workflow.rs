//! Workflow command handlers
//!
//! Validates workflow files and runs them on this machine with the same
//! runner the orchestrator uses.

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use colored::*;
use sluice_core::domain::event::{ManualEvent, PullRequestAction, PullRequestEvent, TriggerEvent};
use sluice_core::domain::job::{JobRun, JobStatus, StepRun, StepStatus};
use sluice_core::domain::run::Run;
use sluice_core::domain::workflow::{Trigger, Workflow};
use sluice_runner::{JobReport, RunReporter, RunnerConfig, Scheduler};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use uuid::Uuid;

use crate::output::{colorize_status, describe_step, print_job, print_logs};

/// Workflow subcommands
#[derive(Subcommand)]
pub enum WorkflowCommands {
    /// Parse and validate a workflow file
    Validate {
        /// Path to the workflow file
        file: PathBuf,
    },
    /// Run a workflow locally
    Run(RunArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the workflow file
    file: PathBuf,

    /// Run only this job (repeatable)
    #[arg(short, long = "job")]
    jobs: Vec<String>,

    /// Event that starts the run
    #[arg(long, value_enum, default_value = "manual")]
    event: EventKind,

    /// Invoking repository: local path, `owner/name` or clone URL
    #[arg(long, default_value = ".")]
    repo: String,

    /// Ref or commit of the invoking repository
    #[arg(long = "ref", default_value = "HEAD")]
    git_ref: String,

    /// Pull-request action (pull-request events only)
    #[arg(long, default_value = "opened")]
    action: PullRequestAction,

    /// Pull-request number (pull-request events only)
    #[arg(long, default_value_t = 1)]
    number: u64,

    /// Pull-request base branch (pull-request events only)
    #[arg(long, default_value = "main")]
    base: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventKind {
    PullRequest,
    Manual,
}

/// Handle workflow commands
///
/// The exit code of a local run is the exit code of the run itself.
pub async fn handle_workflow_command(command: WorkflowCommands) -> Result<ExitCode> {
    match command {
        WorkflowCommands::Validate { file } => validate_workflow(&file).map(|()| ExitCode::SUCCESS),
        WorkflowCommands::Run(args) => run_workflow(args).await,
    }
}

fn load_workflow(path: &Path) -> Result<Workflow> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;

    sluice_lua::parse_workflow(&source)
        .with_context(|| format!("Invalid workflow file: {}", path.display()))
}

fn validate_workflow(path: &Path) -> Result<()> {
    let workflow = load_workflow(path)?;

    println!("{}", "✓ Workflow is valid".green().bold());
    println!();
    println!("  Name:     {}", workflow.name.cyan());
    if let Some(description) = &workflow.description {
        println!("  About:    {}", description);
    }
    println!("  Triggers: {}", describe_triggers(&workflow.triggers));
    for (key, value) in &workflow.env {
        println!("  Env:      {}={}", key.cyan(), value);
    }

    for job in &workflow.jobs {
        println!();
        println!(
            "{} on {}{}",
            job.name.bold(),
            job.runs_on,
            job.toolchain
                .as_ref()
                .map(|t| format!(" (toolchain {})", t))
                .unwrap_or_default()
                .dimmed()
        );
        for (idx, step) in job.steps.iter().enumerate() {
            println!(
                "  {}. {} {}",
                idx + 1,
                step.name,
                format!("- {}", describe_step(step)).dimmed()
            );
        }
    }

    Ok(())
}

fn describe_triggers(triggers: &[Trigger]) -> String {
    let mut names: Vec<String> = triggers
        .iter()
        .map(|trigger| match trigger {
            Trigger::PullRequest { actions } if actions.is_empty() => "pull_request".to_string(),
            Trigger::PullRequest { actions } => {
                let actions: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
                format!("pull_request ({})", actions.join(", "))
            }
            Trigger::Manual => "manual".to_string(),
        })
        .collect();
    if names.is_empty() {
        names.push("manual only".to_string());
    }
    names.join(", ")
}

/// Event for a local run
///
/// A repository given as an existing local path is made absolute so every
/// job can fetch from it regardless of its own working directory.
fn build_event(args: &RunArgs) -> Result<TriggerEvent> {
    let local = Path::new(&args.repo);
    let repository = if local.exists() {
        local
            .canonicalize()
            .with_context(|| format!("Failed to resolve repository path {}", args.repo))?
            .display()
            .to_string()
    } else {
        args.repo.clone()
    };

    Ok(match args.event {
        EventKind::Manual => TriggerEvent::Manual(ManualEvent {
            repository,
            git_ref: args.git_ref.clone(),
        }),
        EventKind::PullRequest => TriggerEvent::PullRequest(PullRequestEvent {
            action: args.action,
            number: args.number,
            repository,
            head_sha: args.git_ref.clone(),
            head_ref: args.git_ref.clone(),
            base_ref: args.base.clone(),
        }),
    })
}

async fn run_workflow(args: RunArgs) -> Result<ExitCode> {
    let mut workflow = load_workflow(&args.file)?;
    if !args.jobs.is_empty() {
        workflow = workflow.select_jobs(&args.jobs)?;
    }

    let event = build_event(&args)?;
    if !workflow.is_triggered_by(&event) {
        println!(
            "{}",
            format!(
                "Workflow '{}' is not triggered by {}",
                workflow.name,
                event.describe()
            )
            .yellow()
        );
        return Ok(ExitCode::SUCCESS);
    }

    let config = RunnerConfig::from_env().context("Invalid runner configuration")?;
    let scheduler = Scheduler::from_config(config)?;

    // Dropping the run on Ctrl-C aborts every job; their environments are
    // discarded when the runtime shuts down the aborted tasks
    let outcome = tokio::select! {
        outcome = scheduler.run(&workflow, event, Arc::new(ConsoleReporter)) => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", "Run cancelled".yellow().bold());
            return Ok(ExitCode::from(130));
        }
    };

    println!();
    println!(
        "{} {} (exit code {})",
        format!("Run of '{}':", outcome.run.workflow).bold(),
        colorize_status(outcome.run.status),
        outcome.exit_code()
    );
    for job in &outcome.run.jobs {
        println!();
        print_job(job);
    }

    for job in outcome
        .run
        .jobs
        .iter()
        .filter(|job| job.status == JobStatus::Failed)
    {
        if let Some(logs) = outcome.logs.get(&job.name) {
            println!();
            print_logs(&format!("Log of failed job '{}':", job.name), logs);
        }
    }

    Ok(ExitCode::from(
        u8::try_from(outcome.exit_code()).unwrap_or(1),
    ))
}

/// Prints run progress as it happens
struct ConsoleReporter;

impl RunReporter for ConsoleReporter {
    fn run_started(&self, run: &Run) {
        println!(
            "{} {} ({} job(s)) for {}",
            "▶ Running".bold(),
            run.workflow.cyan(),
            run.jobs.len(),
            run.event.describe()
        );
    }

    fn job_started(&self, _run_id: Uuid, job: &JobRun) {
        println!("[{}] started on {}", job.name.cyan(), job.runs_on);
    }

    fn step_started(&self, _run_id: Uuid, job: &str, step: &StepRun) {
        println!("[{}] {} {}", job.cyan(), "▸".cyan(), step.name);
    }

    fn step_finished(&self, _run_id: Uuid, job: &str, step: &StepRun) {
        match step.status {
            StepStatus::Succeeded => println!("[{}] {} {}", job.cyan(), "✓".green(), step.name),
            _ => println!(
                "[{}] {} {} (exit code {})",
                job.cyan(),
                "✗".red(),
                step.name,
                step.exit_code.unwrap_or(1)
            ),
        }
    }

    fn job_finished(&self, _run_id: Uuid, report: &JobReport) {
        println!(
            "[{}] {}",
            report.run.name.cyan(),
            colorize_status(report.run.status)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: WorkflowCommands,
    }

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["sluice", "run", "workflow.lua"];
        full.extend_from_slice(argv);
        match TestCli::parse_from(full).command {
            WorkflowCommands::Run(args) => args,
            WorkflowCommands::Validate { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_local_repository_path_made_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(&["--repo", dir.path().to_str().unwrap()]);

        match build_event(&args).unwrap() {
            TriggerEvent::Manual(manual) => {
                assert!(Path::new(&manual.repository).is_absolute());
                assert_eq!(manual.git_ref, "HEAD");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_pull_request_event_from_flags() {
        let args = run_args(&[
            "--event",
            "pull-request",
            "--repo",
            "acme/does-not-exist-locally",
            "--ref",
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904",
            "--action",
            "synchronize",
            "--number",
            "12",
            "-j",
            "tinytodo",
        ]);
        assert_eq!(args.jobs, vec!["tinytodo"]);

        match build_event(&args).unwrap() {
            TriggerEvent::PullRequest(pr) => {
                assert_eq!(pr.repository, "acme/does-not-exist-locally");
                assert_eq!(pr.action, PullRequestAction::Synchronize);
                assert_eq!(pr.number, 12);
                assert_eq!(pr.head_sha, "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
                assert_eq!(pr.base_ref, "main");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_bundled_workflow_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../workflows/ci.lua");
        let workflow = load_workflow(&path).unwrap();

        assert_eq!(workflow.name, "Build and Test");
        assert_eq!(
            describe_triggers(&workflow.triggers),
            "pull_request"
        );
        assert!(validate_workflow(&path).is_ok());
    }

    #[test]
    fn test_missing_workflow_file() {
        let err = load_workflow(Path::new("/nonexistent/workflow.lua")).unwrap_err();
        assert!(err.to_string().contains("Failed to read workflow file"));
    }
}
