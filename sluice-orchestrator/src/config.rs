//! Orchestrator configuration

use anyhow::Context;
use sluice_runner::RunnerConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Where the orchestrator listens and which workflow it runs
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub workflow_path: PathBuf,
    pub bind_addr: String,
    /// Finished runs kept in memory
    pub max_runs: usize,
    pub runner: RunnerConfig,
}

impl OrchestratorConfig {
    /// Reads the configuration from the environment
    ///
    /// - SLUICE_WORKFLOW (default: workflows/ci.lua)
    /// - SLUICE_BIND_ADDR (default: 0.0.0.0:8080)
    /// - SLUICE_MAX_RUNS (default: 100)
    /// - every variable read by `RunnerConfig::from_env`
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let workflow_path = lookup("SLUICE_WORKFLOW")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("workflows/ci.lua"));
        let bind_addr = lookup("SLUICE_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let max_runs = match lookup("SLUICE_MAX_RUNS") {
            Some(value) => value
                .parse()
                .with_context(|| format!("SLUICE_MAX_RUNS must be a number, got '{}'", value))?,
            None => 100,
        };
        let runner = RunnerConfig::from_lookup(&lookup).context("Invalid runner configuration")?;

        Ok(Self {
            workflow_path,
            bind_addr,
            max_runs,
            runner,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address '{}'", self.bind_addr))?;

        if self.max_runs == 0 {
            anyhow::bail!("SLUICE_MAX_RUNS must be at least 1");
        }

        if !self.workflow_path.is_file() {
            anyhow::bail!(
                "Workflow file not found: {}",
                self.workflow_path.display()
            );
        }

        self.runner.validate()
    }
}
