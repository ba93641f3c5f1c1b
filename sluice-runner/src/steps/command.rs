//! Command steps
//!
//! The command string is handed verbatim to the shell with `-e`, so a
//! multi-line script stops at its first failing line.

use sluice_core::domain::log::LogLevel;
use sluice_core::domain::workflow::{RunSpec, StepDefinition};
use sluice_core::error::StepError;

use super::output_tail;
use crate::config::RunnerConfig;
use crate::context::JobContext;
use crate::environment::{Environment, ExecRequest};

/// Exit code reported when the shell itself cannot be started
const SHELL_NOT_FOUND: i32 = 127;

pub async fn run_command(
    environment: &dyn Environment,
    context: &JobContext,
    config: &RunnerConfig,
    step: &StepDefinition,
    spec: &RunSpec,
) -> Result<(), StepError> {
    let shell = spec.shell.as_deref().unwrap_or(&config.shell);

    let request = ExecRequest::new(shell)
        .args(["-e", "-c", spec.command.as_str()])
        .cwd(step.working_directory.clone())
        .envs(context.env_with(&step.env));

    context.log_info(format!("$ {}", spec.command));

    let output = match environment.exec(request).await {
        Ok(output) => output,
        Err(e) => {
            let message = format!("{:#}", e);
            context.log_error(message.clone());
            return Err(StepError::StepExecution {
                step: step.name.clone(),
                exit_code: SHELL_NOT_FOUND,
                output: message,
            });
        }
    };

    context.log_lines(LogLevel::Info, &output.stdout);
    context.log_lines(LogLevel::Warning, &output.stderr);

    if !output.success() {
        context.log_error(format!(
            "Process completed with exit code {}",
            output.exit_code
        ));
        return Err(StepError::StepExecution {
            step: step.name.clone(),
            exit_code: output.exit_code,
            output: output_tail(&output),
        });
    }

    Ok(())
}
