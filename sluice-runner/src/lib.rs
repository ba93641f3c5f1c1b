//! Sluice Runner
//!
//! Executes workflow runs: every job gets a clean environment of its own,
//! its steps run strictly in order, and jobs run concurrently without
//! sharing anything.
//!
//! Architecture:
//! - Configuration: workspace location, isolation backend, concurrency cap
//! - Environments: host directories or podman containers, one per job
//! - Steps: checkout, toolchain setup and shell commands
//! - Executor: one job from acquisition to discarded environment
//! - Scheduler: all jobs of a run, progress reported through `RunReporter`

pub mod config;
pub mod context;
pub mod environment;
pub mod executor;
pub mod reporter;
pub mod scheduler;
pub mod steps;

#[cfg(test)]
mod testing;

pub use config::{Isolation, RunnerConfig};
pub use executor::{JobExecutor, JobReport};
pub use reporter::{NoopReporter, RunReporter};
pub use scheduler::{RunOutcome, Scheduler};
