//! Scripted environments for tests
//!
//! `ScriptedProvider` hands out environments that never start a process.
//! Every request is recorded with the job that issued it, and responses come
//! from responders registered by the test (first match wins).

use async_trait::async_trait;
use sluice_core::error::StepError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use uuid::Uuid;

use crate::environment::{Environment, EnvironmentProvider, ExecOutput, ExecRequest};

/// Commit reported by `git rev-parse HEAD` unless a responder overrides it
pub const FAKE_SHA: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

type Responder = Arc<dyn Fn(&ExecRequest) -> Option<ExecOutput> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RecordedExec {
    pub job: String,
    pub platform: String,
    pub request: ExecRequest,
}

#[derive(Clone, Default)]
pub struct ScriptedProvider {
    responders: Vec<Responder>,
    unavailable: Vec<String>,
    barrier: Option<Arc<Barrier>>,
    history: Arc<Mutex<Vec<RecordedExec>>>,
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(
        mut self,
        responder: impl Fn(&ExecRequest) -> Option<ExecOutput> + Send + Sync + 'static,
    ) -> Self {
        self.responders.push(Arc::new(responder));
        self
    }

    /// Any request whose command line contains `needle` exits with `exit_code`
    pub fn fail_command(self, needle: &str, exit_code: i32) -> Self {
        let needle = needle.to_string();
        self.respond(move |request| {
            request.command_line().contains(&needle).then(|| ExecOutput {
                stdout: String::new(),
                stderr: format!("{} failed", needle),
                exit_code,
            })
        })
    }

    /// Acquiring an environment for `platform` fails
    pub fn unavailable(mut self, platform: &str) -> Self {
        self.unavailable.push(platform.to_string());
        self
    }

    /// Commands mentioning "barrier" wait on it before answering
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn history(&self) -> Vec<RecordedExec> {
        self.history.lock().unwrap().clone()
    }

    /// Commands issued by a job, in order; shell steps show only their script
    pub fn commands(&self, job: &str) -> Vec<String> {
        self.history()
            .into_iter()
            .filter(|exec| exec.job == job)
            .map(|exec| match exec.request.args.as_slice() {
                [flag, c, script] if flag == "-e" && c == "-c" => script.clone(),
                _ => exec.request.command_line(),
            })
            .collect()
    }

    /// Environments acquired and not yet dropped
    pub fn live_environments(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }

    fn answer(&self, request: &ExecRequest) -> ExecOutput {
        self.responders
            .iter()
            .find_map(|responder| responder(request))
            .unwrap_or_else(|| default_output(request))
    }
}

fn default_output(request: &ExecRequest) -> ExecOutput {
    let line = request.command_line();
    if line.starts_with("git rev-parse") {
        ExecOutput {
            stdout: format!("{}\n", FAKE_SHA),
            ..Default::default()
        }
    } else if line.starts_with("java -version") {
        ExecOutput {
            stderr: "openjdk version \"17.0.9\" 2023-10-17\n".to_string(),
            ..Default::default()
        }
    } else if line.starts_with("rustc --version") {
        ExecOutput {
            stdout: "rustc 1.90.0 (1159e78c4 2025-09-14)\n".to_string(),
            ..Default::default()
        }
    } else {
        ExecOutput::default()
    }
}

#[async_trait]
impl EnvironmentProvider for ScriptedProvider {
    async fn acquire(
        &self,
        job_id: Uuid,
        platform: &str,
    ) -> Result<Box<dyn Environment>, StepError> {
        if self.unavailable.iter().any(|p| p == platform) {
            return Err(StepError::Environment {
                platform: platform.to_string(),
                message: "no runner for this platform".to_string(),
            });
        }

        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEnvironment {
            provider: self.clone(),
            platform: platform.to_string(),
            workspace: PathBuf::from(format!("/scripted/{}", job_id)),
        }))
    }
}

pub struct ScriptedEnvironment {
    provider: ScriptedProvider,
    platform: String,
    workspace: PathBuf,
}

#[async_trait]
impl Environment for ScriptedEnvironment {
    async fn exec(&self, request: ExecRequest) -> anyhow::Result<ExecOutput> {
        self.provider.history.lock().unwrap().push(RecordedExec {
            job: request.env.get("SLUICE_JOB").cloned().unwrap_or_default(),
            platform: self.platform.clone(),
            request: request.clone(),
        });

        if request.command_line().contains("barrier") {
            if let Some(barrier) = &self.provider.barrier {
                barrier.wait().await;
            }
        }

        Ok(self.provider.answer(&request))
    }

    fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn describe(&self) -> String {
        format!("scripted environment {}", self.workspace.display())
    }
}

impl Drop for ScriptedEnvironment {
    fn drop(&mut self) {
        self.provider.released.fetch_add(1, Ordering::SeqCst);
    }
}
