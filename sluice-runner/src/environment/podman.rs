//! Podman environments
//!
//! Handles container lifecycle for job execution:
//! - Checking podman availability
//! - Mapping the job's platform label to an image
//! - Starting one container per job with the workspace mounted
//! - Executing commands in the container
//! - Removing the container when the job is done

use anyhow::{Context, Result};
use async_trait::async_trait;
use sluice_core::error::StepError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{Environment, EnvironmentProvider, ExecOutput, ExecRequest};

/// Mount point of the job workspace inside the container
const CONTAINER_WORKSPACE: &str = "/workspace";

/// Checks if podman is installed and available
pub async fn check_podman_available() -> Result<()> {
    let output = Command::new("podman")
        .arg("--version")
        .output()
        .await
        .context("Failed to execute 'podman --version'. Is podman installed?")?;

    if !output.status.success() {
        anyhow::bail!("Podman is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    debug!("Podman is available: {}", version.trim());

    Ok(())
}

/// Starts one container per job from the image mapped to its platform label
pub struct PodmanProvider {
    workspace_base: PathBuf,
    platform_images: HashMap<String, String>,
}

impl PodmanProvider {
    pub fn new(workspace_base: PathBuf, platform_images: HashMap<String, String>) -> Self {
        Self {
            workspace_base,
            platform_images,
        }
    }

    async fn start_container(&self, job_id: Uuid, image: &str, workspace: &Path) -> Result<String> {
        check_podman_available().await?;

        tokio::fs::create_dir_all(workspace)
            .await
            .context("Failed to create workspace directory")?;

        let container_name = format!("sluice-{}", job_id);
        info!("Creating container {} for image {}", container_name, image);

        // Entrypoint is overridden so images with custom entrypoints still idle
        let output = Command::new("podman")
            .arg("run")
            .arg("-d")
            .arg("--name")
            .arg(&container_name)
            .arg("--entrypoint")
            .arg("/bin/sh")
            .arg("-v")
            .arg(format!("{}:{}", workspace.display(), CONTAINER_WORKSPACE))
            .arg("-w")
            .arg(CONTAINER_WORKSPACE)
            .arg(image)
            .arg("-c")
            .arg("sleep infinity")
            .output()
            .await
            .context("Failed to execute podman run command")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stderr.trim().is_empty() {
            debug!("podman run stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            let error_msg = format!(
                "Failed to start container for image {}: exit_code={}, stderr='{}'",
                image,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
            error!("{}", error_msg);
            anyhow::bail!(error_msg);
        }

        info!(
            "Container {} started with ID: {}",
            container_name,
            stdout.trim()
        );

        Ok(container_name)
    }
}

#[async_trait]
impl EnvironmentProvider for PodmanProvider {
    async fn acquire(
        &self,
        job_id: Uuid,
        platform: &str,
    ) -> Result<Box<dyn Environment>, StepError> {
        let image = self
            .platform_images
            .get(platform)
            .ok_or_else(|| StepError::Environment {
                platform: platform.to_string(),
                message: "no container image configured for this platform".to_string(),
            })?;

        let workspace = self.workspace_base.join(job_id.to_string());

        let container_name = self
            .start_container(job_id, image, &workspace)
            .await
            .map_err(|e| StepError::Environment {
                platform: platform.to_string(),
                message: format!("{:#}", e),
            })?;

        Ok(Box::new(PodmanEnvironment {
            container_name,
            image: image.clone(),
            workspace,
        }))
    }
}

/// Container dedicated to one job, force-removed on drop
pub struct PodmanEnvironment {
    container_name: String,
    image: String,
    workspace: PathBuf,
}

impl PodmanEnvironment {
    fn working_dir(&self, cwd: Option<&str>) -> String {
        match cwd {
            Some(dir) => format!("{}/{}", CONTAINER_WORKSPACE, dir),
            None => CONTAINER_WORKSPACE.to_string(),
        }
    }
}

#[async_trait]
impl Environment for PodmanEnvironment {
    async fn exec(&self, request: ExecRequest) -> Result<ExecOutput> {
        debug!(
            "Executing in container {}: {}",
            self.container_name,
            request.command_line()
        );

        let mut command = Command::new("podman");
        command
            .arg("exec")
            .arg("-w")
            .arg(self.working_dir(request.cwd.as_deref()));

        for (key, value) in &request.env {
            command.arg("-e").arg(format!("{}={}", key, value));
        }

        let output = command
            .arg(&self.container_name)
            .arg(&request.program)
            .args(&request.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute podman exec command")?;

        let exit_code = output.status.code().unwrap_or(1);
        debug!(
            "Command in container {} exited with {}",
            self.container_name, exit_code
        );

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
        })
    }

    fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn describe(&self) -> String {
        format!("container {} ({})", self.container_name, self.image)
    }
}

impl Drop for PodmanEnvironment {
    fn drop(&mut self) {
        // Drop cannot await
        let rm_output = std::process::Command::new("podman")
            .arg("rm")
            .arg("-f")
            .arg(&self.container_name)
            .output();

        match rm_output {
            Ok(output) if output.status.success() => {
                debug!("Container {} removed", self.container_name);
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    "Failed to remove container {}: {}",
                    self.container_name,
                    stderr.trim()
                );
            }
            Err(e) => {
                warn!("Failed to remove container {}: {}", self.container_name, e);
            }
        }

        if let Err(e) = std::fs::remove_dir_all(&self.workspace) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove workspace {}: {}",
                    self.workspace.display(),
                    e
                );
            }
        }
    }
}
