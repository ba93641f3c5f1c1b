//! Step implementations
//!
//! Each step kind turns into one or more processes run in the job's
//! environment. A step either completes or returns the `StepError` that
//! stops its job.

pub mod checkout;
pub mod command;
pub mod toolchain;

use sluice_core::domain::event::TriggerEvent;
use sluice_core::domain::log::LogLevel;
use sluice_core::domain::workflow::{JobDefinition, StepAction, StepDefinition};
use sluice_core::error::StepError;

use crate::config::RunnerConfig;
use crate::context::JobContext;
use crate::environment::{Environment, ExecOutput, ExecRequest};

/// Lines of process output kept in a step error
const OUTPUT_TAIL_LINES: usize = 40;

/// Runs one step to completion
pub async fn execute_step(
    environment: &dyn Environment,
    context: &JobContext,
    config: &RunnerConfig,
    job: &JobDefinition,
    step: &StepDefinition,
    event: &TriggerEvent,
) -> Result<(), StepError> {
    match &step.action {
        StepAction::Checkout(spec) => {
            checkout::checkout(environment, context, config, step, spec, event).await
        }
        StepAction::Toolchain(spec) => {
            toolchain::setup_toolchain(environment, context, job, step, spec).await
        }
        StepAction::Run(spec) => {
            command::run_command(environment, context, config, step, spec).await
        }
    }
}

/// Runs a helper process, treating a non-zero exit as an error message
///
/// Output goes to the job log at debug level.
pub(crate) async fn exec_checked(
    environment: &dyn Environment,
    context: &JobContext,
    request: ExecRequest,
) -> Result<ExecOutput, String> {
    let command_line = request.command_line();
    context.log_debug(format!("$ {}", command_line));

    let output = environment
        .exec(request)
        .await
        .map_err(|e| format!("{:#}", e))?;

    context.log_lines(LogLevel::Debug, &output.stdout);
    context.log_lines(LogLevel::Debug, &output.stderr);

    if !output.success() {
        let detail = tail(&output.stderr, 5);
        return Err(if detail.is_empty() {
            format!("'{}' exited with code {}", command_line, output.exit_code)
        } else {
            format!(
                "'{}' exited with code {}: {}",
                command_line, output.exit_code, detail
            )
        });
    }

    Ok(output)
}

/// Last `lines` non-empty lines of `text`
pub(crate) fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}

pub(crate) fn output_tail(output: &ExecOutput) -> String {
    let combined = format!("{}\n{}", output.stdout, output.stderr);
    tail(&combined, OUTPUT_TAIL_LINES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_last_lines() {
        let text = "one\n\ntwo\nthree\nfour\n";
        assert_eq!(tail(text, 2), "three\nfour");
        assert_eq!(tail(text, 10), "one\ntwo\nthree\nfour");
        assert_eq!(tail("", 3), "");
    }
}
