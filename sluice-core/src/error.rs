//! Error taxonomy
//!
//! Every step error is fatal to its job: the job stops at the first one and
//! reports it. Nothing is retried or rolled back.

use thiserror::Error;

/// Failure of a job step (or of acquiring the job's environment)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// No clean environment matching the platform label
    #[error("environment for '{platform}' unavailable: {message}")]
    Environment { platform: String, message: String },

    /// Repository or ref unreachable
    #[error("checkout of {repository}@{git_ref} failed: {message}")]
    Checkout {
        repository: String,
        git_ref: String,
        message: String,
    },

    /// Requested toolchain version unavailable
    #[error("toolchain {toolchain} unavailable: {message}")]
    Toolchain { toolchain: String, message: String },

    /// Command exited non-zero
    #[error("step '{step}' exited with code {exit_code}")]
    StepExecution {
        step: String,
        exit_code: i32,
        output: String,
    },
}

impl StepError {
    /// Exit code surfaced as the job's failure signal
    pub fn exit_code(&self) -> i32 {
        match self {
            StepError::StepExecution { exit_code, .. } => *exit_code,
            _ => 1,
        }
    }
}

/// Invalid workflow definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("invalid workflow: {0}")]
    Invalid(String),

    #[error("job '{job}': {message}")]
    InvalidJob { job: String, message: String },

    #[error("duplicate job name '{0}'")]
    DuplicateJob(String),

    #[error("unknown job '{0}'")]
    UnknownJob(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let exec = StepError::StepExecution {
            step: "cargo build".to_string(),
            exit_code: 101,
            output: String::new(),
        };
        assert_eq!(exec.exit_code(), 101);

        let checkout = StepError::Checkout {
            repository: "cedar-policy/cedar".to_string(),
            git_ref: "main".to_string(),
            message: "repository not found".to_string(),
        };
        assert_eq!(checkout.exit_code(), 1);
        assert!(checkout.to_string().contains("cedar-policy/cedar@main"));
    }
}
