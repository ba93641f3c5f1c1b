//! Core domain types
//!
//! This module contains the domain structures shared across Sluice crates.
//! The runner executes them, the orchestrator keeps them in memory and
//! serves them, the CLI and client display them.

pub mod event;
pub mod job;
pub mod log;
pub mod run;
pub mod workflow;
