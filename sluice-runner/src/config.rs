//! Runner configuration
//!
//! Defines where job workspaces live, how jobs are isolated, how platform
//! labels map to container images and how repository identifiers resolve
//! to clone URLs.

use std::collections::HashMap;
use std::path::PathBuf;

/// How each job's clean environment is provided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Fresh workspace directory on the host
    Host,
    /// One podman container per job, workspace mounted at /workspace
    Podman,
}

impl std::str::FromStr for Isolation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" => Ok(Isolation::Host),
            "podman" => Ok(Isolation::Podman),
            other => anyhow::bail!("unknown isolation mode '{}' (expected host or podman)", other),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory under which every job gets its own workspace
    pub workspace_base: PathBuf,

    /// Upper bound on concurrently executing jobs of one run
    pub max_parallel_jobs: usize,

    pub isolation: Isolation,

    /// Platform label -> container image, used with podman isolation
    pub platform_images: HashMap<String, String>,

    /// Prefix for `owner/name` repository identifiers
    pub git_base_url: String,

    /// Shell used for command steps that do not name one
    pub shell: String,
}

impl RunnerConfig {
    /// Creates a configuration with defaults
    pub fn new(workspace_base: PathBuf) -> Self {
        let mut platform_images = HashMap::new();
        platform_images.insert(
            "ubuntu-latest".to_string(),
            "docker.io/library/rust:latest".to_string(),
        );

        Self {
            workspace_base,
            max_parallel_jobs: 4,
            isolation: Isolation::Host,
            platform_images,
            git_base_url: "https://github.com".to_string(),
            shell: "sh".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognized variables (all optional):
    /// - SLUICE_WORKSPACE_BASE (default: $TMPDIR/sluice)
    /// - SLUICE_MAX_PARALLEL_JOBS (default: 4)
    /// - SLUICE_ISOLATION (host | podman, default: host)
    /// - SLUICE_PLATFORM_IMAGES (comma-separated label=image pairs)
    /// - SLUICE_GIT_BASE_URL (default: https://github.com)
    /// - SLUICE_SHELL (default: sh)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let workspace_base = lookup("SLUICE_WORKSPACE_BASE")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("sluice"));

        let mut config = Self::new(workspace_base);

        if let Some(value) = lookup("SLUICE_MAX_PARALLEL_JOBS") {
            config.max_parallel_jobs = value
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("SLUICE_MAX_PARALLEL_JOBS must be a number"))?;
        }

        if let Some(value) = lookup("SLUICE_ISOLATION") {
            config.isolation = value.parse()?;
        }

        if let Some(value) = lookup("SLUICE_PLATFORM_IMAGES") {
            config.platform_images = parse_platform_images(&value)?;
        }

        if let Some(value) = lookup("SLUICE_GIT_BASE_URL") {
            config.git_base_url = value.trim_end_matches('/').to_string();
        }

        if let Some(value) = lookup("SLUICE_SHELL") {
            config.shell = value;
        }

        Ok(config)
    }

    /// Maps a platform label to a container image
    pub fn with_platform_image(mut self, label: &str, image: &str) -> Self {
        self.platform_images
            .insert(label.to_string(), image.to_string());
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        if self.shell.trim().is_empty() {
            anyhow::bail!("shell cannot be empty");
        }

        if !self.git_base_url.starts_with("http://")
            && !self.git_base_url.starts_with("https://")
            && !self.git_base_url.starts_with("file://")
        {
            anyhow::bail!("git_base_url must start with http://, https:// or file://");
        }

        if self.isolation == Isolation::Podman && self.platform_images.is_empty() {
            anyhow::bail!("podman isolation requires at least one platform image");
        }

        Ok(())
    }

    /// Resolves a repository identifier to something `git fetch` accepts
    ///
    /// `owner/name` becomes `{git_base_url}/owner/name.git`; URLs and paths
    /// are used verbatim.
    pub fn repository_url(&self, repository: &str) -> String {
        let is_url = repository.contains("://") || repository.starts_with("git@");
        let is_path = repository.starts_with('/') || repository.starts_with('.');
        let is_slug = repository.split('/').count() == 2
            && repository
                .split('/')
                .all(|part| !part.is_empty() && !part.contains(char::is_whitespace));

        if !is_url && !is_path && is_slug {
            format!("{}/{}.git", self.git_base_url, repository)
        } else {
            repository.to_string()
        }
    }
}

fn parse_platform_images(value: &str) -> anyhow::Result<HashMap<String, String>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (label, image) = pair.split_once('=').ok_or_else(|| {
                anyhow::anyhow!("invalid platform image '{}': expected label=image", pair)
            })?;
            Ok((label.trim().to_string(), image.trim().to_string()))
        })
        .collect()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("sluice"))
    }
}
