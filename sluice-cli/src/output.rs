//! Terminal output helpers shared by the commands

use colored::*;
use sluice_core::domain::job::{JobRun, JobStatus, StepStatus};
use sluice_core::domain::log::{LogEntry, LogLevel};
use sluice_core::domain::run::Run;
use sluice_core::domain::workflow::{StepAction, StepDefinition};
use sluice_core::dto::run::RunSummary;

/// Colorize job or run status for display
pub fn colorize_status(status: JobStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::Pending => status_str.yellow(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Succeeded => status_str.green(),
        JobStatus::Failed => status_str.red(),
        JobStatus::Cancelled => status_str.dimmed(),
    }
}

fn step_marker(status: StepStatus) -> ColoredString {
    match status {
        StepStatus::Pending => "·".dimmed(),
        StepStatus::Running => "▸".cyan(),
        StepStatus::Succeeded => "✓".green(),
        StepStatus::Failed => "✗".red(),
        StepStatus::NotRun => "-".dimmed(),
    }
}

/// One-line description of what a step does
pub fn describe_step(step: &StepDefinition) -> String {
    match &step.action {
        StepAction::Checkout(spec) => match &spec.repository {
            None => "checkout <invoking repository>".to_string(),
            Some(repository) => format!(
                "checkout {}@{} -> {}",
                repository,
                spec.git_ref.as_deref().unwrap_or("main"),
                spec.path.as_deref().unwrap_or(".")
            ),
        },
        StepAction::Toolchain(spec) => {
            let mut description = format!(
                "toolchain {} {}",
                spec.kind,
                spec.channel.as_deref().unwrap_or("<job default>")
            );
            if !spec.components.is_empty() {
                description.push_str(&format!(" [{}]", spec.components.join(", ")));
            }
            description
        }
        StepAction::Run(spec) => match &step.working_directory {
            Some(dir) => format!("run `{}` in {}", spec.command, dir),
            None => format!("run `{}`", spec.command),
        },
    }
}

/// Print a run summary line
pub fn print_run_summary(run: &RunSummary) {
    println!(
        "  {} Run {} {}",
        "▸".cyan(),
        run.id.to_string().dimmed(),
        colorize_status(run.status)
    );
    println!("    Workflow:  {}", run.workflow);
    println!("    Event:     {}", run.event);
    println!(
        "    Requested: {}",
        run.requested_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    for job in &run.jobs {
        match job.exit_code {
            Some(code) if code != 0 => println!(
                "      {} {} (exit code {})",
                job.name,
                colorize_status(job.status),
                code
            ),
            _ => println!("      {} {}", job.name, colorize_status(job.status)),
        }
    }
    println!();
}

/// Print detailed run information with every job and step
pub fn print_run_details(run: &Run) {
    println!("{}", "Run Details:".bold());
    println!("  ID:        {}", run.id.to_string().cyan());
    println!("  Workflow:  {}", run.workflow);
    println!("  Event:     {}", run.event.describe());
    println!("  Status:    {}", colorize_status(run.status));
    println!(
        "  Requested: {}",
        run.requested_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(completed) = run.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if run.status.is_terminal() {
        println!("  Exit Code: {}", run.exit_code());
    }

    for job in &run.jobs {
        println!();
        print_job(job);
    }
}

/// Print a job with its steps and result
pub fn print_job(job: &JobRun) {
    println!(
        "{} {} on {}",
        job.name.bold(),
        colorize_status(job.status),
        job.runs_on.dimmed()
    );

    if let (Some(started), Some(completed)) = (job.started_at, job.completed_at) {
        let duration = completed.signed_duration_since(started);
        println!("  Duration: {}s", duration.num_seconds());
    }

    for step in &job.steps {
        match step.exit_code {
            Some(code) if code != 0 => println!(
                "  {} {} (exit code {})",
                step_marker(step.status),
                step.name,
                code
            ),
            _ => println!("  {} {}", step_marker(step.status), step.name),
        }
    }

    if let Some(error) = job.result.as_ref().and_then(|r| r.error_message.as_ref()) {
        println!("  {}", error.red());
    }
}

/// Print a log entry
pub fn print_log_entry(log: &LogEntry) {
    let level_str = format!("{:?}", log.level).to_uppercase();
    let level_colored = match log.level {
        LogLevel::Debug => level_str.dimmed(),
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    println!(
        "{} [{}] {}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        log.message
    );
}

/// Print a block of log entries under a heading
pub fn print_logs(heading: &str, logs: &[LogEntry]) {
    println!("{}", heading.bold());
    println!("{}", "─".repeat(80).dimmed());
    for log in logs {
        print_log_entry(log);
    }
    println!("{}", "─".repeat(80).dimmed());
}
