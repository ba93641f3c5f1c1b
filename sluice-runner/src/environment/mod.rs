//! Job execution environments
//!
//! Every job runs in a clean environment acquired for it alone and
//! discarded when the job ends. Two backends exist:
//! - `host`: a fresh directory on the runner machine
//! - `podman`: a dedicated container with the workspace mounted

pub mod host;
pub mod podman;

use async_trait::async_trait;
use sluice_core::error::StepError;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

pub use host::{HostEnvironment, HostProvider};
pub use podman::{PodmanEnvironment, PodmanProvider};

use crate::config::{Isolation, RunnerConfig};

/// A process to run inside an environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Relative to the workspace root; `None` runs at the root
    pub cwd: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl ExecRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: Option<String>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn envs(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Program and arguments joined by spaces, for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Clean environment owned by exactly one job
///
/// Dropping the value discards the environment and everything in it.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Runs a process to completion
    ///
    /// A non-zero exit is reported through `ExecOutput::exit_code`; an error
    /// means the process could not be started at all.
    async fn exec(&self, request: ExecRequest) -> anyhow::Result<ExecOutput>;

    /// Workspace directory on the runner machine
    fn workspace(&self) -> &Path;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Hands out clean environments per platform label
#[async_trait]
pub trait EnvironmentProvider: Send + Sync {
    async fn acquire(
        &self,
        job_id: Uuid,
        platform: &str,
    ) -> Result<Box<dyn Environment>, StepError>;
}

/// Builds the provider selected by the configuration
pub fn provider_for(config: &RunnerConfig) -> Arc<dyn EnvironmentProvider> {
    match config.isolation {
        Isolation::Host => Arc::new(HostProvider::new(config.workspace_base.clone())),
        Isolation::Podman => Arc::new(PodmanProvider::new(
            config.workspace_base.clone(),
            config.platform_images.clone(),
        )),
    }
}
