//! Host environments
//!
//! A job gets a fresh, empty directory under the workspace base. Processes
//! run directly on the runner machine with that directory as their root.

use anyhow::Context;
use async_trait::async_trait;
use sluice_core::error::StepError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Environment, EnvironmentProvider, ExecOutput, ExecRequest};

/// Provides one fresh workspace directory per job
pub struct HostProvider {
    workspace_base: PathBuf,
}

impl HostProvider {
    pub fn new(workspace_base: PathBuf) -> Self {
        Self { workspace_base }
    }
}

#[async_trait]
impl EnvironmentProvider for HostProvider {
    async fn acquire(
        &self,
        job_id: Uuid,
        platform: &str,
    ) -> Result<Box<dyn Environment>, StepError> {
        let workspace = self.workspace_base.join(job_id.to_string());
        let unavailable = |message: String| StepError::Environment {
            platform: platform.to_string(),
            message,
        };

        if workspace.exists() {
            tokio::fs::remove_dir_all(&workspace)
                .await
                .map_err(|e| unavailable(format!("failed to clear stale workspace: {}", e)))?;
        }

        tokio::fs::create_dir_all(&workspace)
            .await
            .map_err(|e| {
                unavailable(format!(
                    "failed to create workspace {}: {}",
                    workspace.display(),
                    e
                ))
            })?;

        info!(
            "Created host workspace {} for job {} ({})",
            workspace.display(),
            job_id,
            platform
        );

        Ok(Box::new(HostEnvironment { workspace }))
    }
}

/// Fresh directory on the runner machine, removed on drop
pub struct HostEnvironment {
    workspace: PathBuf,
}

#[async_trait]
impl Environment for HostEnvironment {
    async fn exec(&self, request: ExecRequest) -> anyhow::Result<ExecOutput> {
        let working_dir = match &request.cwd {
            Some(dir) => self.workspace.join(dir),
            None => self.workspace.clone(),
        };

        debug!(
            "Executing on host in {}: {}",
            working_dir.display(),
            request.command_line()
        );

        let output = Command::new(&request.program)
            .args(&request.args)
            .envs(&request.env)
            .current_dir(&working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute '{}'", request.program))?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            // Killed by a signal
            exit_code: output.status.code().unwrap_or(1),
        })
    }

    fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn describe(&self) -> String {
        format!("host workspace {}", self.workspace.display())
    }
}

impl Drop for HostEnvironment {
    fn drop(&mut self) {
        let workspace = std::mem::take(&mut self.workspace);

        // Build trees can take a while to delete; keep that off the async workers
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_workspace(&workspace));
            }
            Err(_) => remove_workspace(&workspace),
        }
    }
}

fn remove_workspace(workspace: &Path) {
    match std::fs::remove_dir_all(workspace) {
        Ok(()) => debug!("Removed workspace {}", workspace.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove workspace {}: {}", workspace.display(), e),
    }
}
