//! Workflow domain types
//!
//! A workflow is the declarative job list a run executes. Jobs are independent
//! of each other; the steps of a job form a fixed, totally ordered sequence.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};

use crate::domain::event::{PullRequestAction, TriggerEvent};
use crate::error::WorkflowError;

/// Git ref used for external checkouts that do not name one
pub const DEFAULT_CHECKOUT_REF: &str = "main";

/// Declarative workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub description: Option<String>,
    pub triggers: Vec<Trigger>,
    /// Variables visible to every job
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Jobs in declaration order
    pub jobs: Vec<JobDefinition>,
}

/// Event kinds that start a run of the workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Pull-request events; an empty action list means the default set
    PullRequest { actions: Vec<PullRequestAction> },
    Manual,
}

impl Trigger {
    /// Actions a pull-request trigger reacts to when none are declared
    pub const DEFAULT_PULL_REQUEST_ACTIONS: [PullRequestAction; 3] = [
        PullRequestAction::Opened,
        PullRequestAction::Synchronize,
        PullRequestAction::Reopened,
    ];

    fn matches(&self, event: &TriggerEvent) -> bool {
        match (self, event) {
            (Trigger::PullRequest { actions }, TriggerEvent::PullRequest(pr)) => {
                if actions.is_empty() {
                    Self::DEFAULT_PULL_REQUEST_ACTIONS.contains(&pr.action)
                } else {
                    actions.contains(&pr.action)
                }
            }
            (Trigger::Manual, TriggerEvent::Manual(_)) => true,
            _ => false,
        }
    }
}

/// A job: an independently scheduled sequence of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    /// Platform / runner label selecting the execution environment
    pub runs_on: String,
    /// Toolchain selector (e.g. "stable") used by toolchain steps without a channel
    pub toolchain: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub steps: Vec<StepDefinition>,
}

/// One unit of work within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    /// Relative to the workspace root; `None` runs at the root
    pub working_directory: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    Checkout(CheckoutSpec),
    Toolchain(ToolchainSpec),
    Run(RunSpec),
}

/// Repository checkout
///
/// Without a repository the invoking repository is checked out at its
/// triggering commit. A branch name as `git_ref` is a floating input: it is
/// resolved every time the step runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSpec {
    pub repository: Option<String>,
    pub git_ref: Option<String>,
    pub path: Option<String>,
}

impl CheckoutSpec {
    /// Whether this step fetches the repository that triggered the run
    pub fn is_invoking_repository(&self) -> bool {
        self.repository.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainSpec {
    pub kind: ToolchainKind,
    pub channel: Option<String>,
    #[serde(default)]
    pub components: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolchainKind {
    Rust,
    Java,
}

impl std::fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolchainKind::Rust => write!(f, "rust"),
            ToolchainKind::Java => write!(f, "java"),
        }
    }
}

impl std::str::FromStr for ToolchainKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rust" => Ok(ToolchainKind::Rust),
            "java" => Ok(ToolchainKind::Java),
            other => Err(WorkflowError::Invalid(format!(
                "unknown toolchain kind '{}'",
                other
            ))),
        }
    }
}

/// Shell command executed verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    pub command: String,
    /// Overrides the runner's default shell
    pub shell: Option<String>,
}

impl Workflow {
    /// Checks structural invariants of the definition
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::Invalid(
                "workflow name cannot be empty".to_string(),
            ));
        }

        if self.jobs.is_empty() {
            return Err(WorkflowError::Invalid(
                "workflow must declare at least one job".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(WorkflowError::Invalid("job name cannot be empty".to_string()));
            }
            if !is_valid_job_name(&job.name) {
                return Err(WorkflowError::InvalidJob {
                    job: job.name.clone(),
                    message: "job names may only contain letters, digits, '_', '-' and '.'"
                        .to_string(),
                });
            }
            if !seen.insert(job.name.as_str()) {
                return Err(WorkflowError::DuplicateJob(job.name.clone()));
            }
            job.validate()?;
        }

        Ok(())
    }

    /// Whether the event starts a run of this workflow
    ///
    /// Manual events always trigger, so a workflow can be run on demand.
    pub fn is_triggered_by(&self, event: &TriggerEvent) -> bool {
        matches!(event, TriggerEvent::Manual(_)) || self.triggers.iter().any(|t| t.matches(event))
    }

    pub fn job(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// Keeps only the named jobs, preserving declaration order
    pub fn select_jobs(&self, names: &[String]) -> Result<Workflow, WorkflowError> {
        if let Some(missing) = names.iter().find(|name| self.job(name).is_none()) {
            return Err(WorkflowError::UnknownJob(missing.clone()));
        }

        let mut selected = self.clone();
        selected.jobs.retain(|job| names.contains(&job.name));
        Ok(selected)
    }
}

impl JobDefinition {
    fn validate(&self) -> Result<(), WorkflowError> {
        let invalid = |message: String| WorkflowError::InvalidJob {
            job: self.name.clone(),
            message,
        };

        if self.runs_on.trim().is_empty() {
            return Err(invalid("runs_on cannot be empty".to_string()));
        }

        if self.steps.is_empty() {
            return Err(invalid("job must have at least one step".to_string()));
        }

        for step in &self.steps {
            if let Some(dir) = &step.working_directory {
                check_relative_path(dir).map_err(|m| {
                    invalid(format!("step '{}': working_directory {}", step.name, m))
                })?;
            }

            match &step.action {
                StepAction::Checkout(spec) => {
                    if let Some(path) = &spec.path {
                        check_relative_path(path)
                            .map_err(|m| invalid(format!("step '{}': path {}", step.name, m)))?;
                    }
                    if matches!(&spec.repository, Some(r) if r.trim().is_empty()) {
                        return Err(invalid(format!(
                            "step '{}': repository cannot be empty",
                            step.name
                        )));
                    }
                }
                StepAction::Toolchain(spec) => {
                    if self.resolve_channel(spec).is_none() {
                        return Err(invalid(format!(
                            "step '{}': no toolchain channel declared on the step or the job",
                            step.name
                        )));
                    }
                }
                StepAction::Run(spec) => {
                    if spec.command.trim().is_empty() {
                        return Err(invalid(format!("step '{}': command is empty", step.name)));
                    }
                }
            }
        }

        Ok(())
    }

    /// Channel for a toolchain step: the step's own, else the job's selector
    pub fn resolve_channel<'a>(&'a self, spec: &'a ToolchainSpec) -> Option<&'a str> {
        spec.channel
            .as_deref()
            .or(self.toolchain.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

/// Relative paths must stay inside the workspace
fn check_relative_path(path: &str) -> Result<(), &'static str> {
    let path = Path::new(path);
    if path.is_absolute() {
        return Err("must be relative to the workspace");
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err("must not leave the workspace");
    }
    Ok(())
}

/// Job names end up as a single URL path segment
fn is_valid_job_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
