//! Repository Module
//!
//! Storage layer for the orchestrator.
//! Runs live in memory for the lifetime of the process.

pub mod run;

// Re-export for convenience
pub use run::{Cancellation, RunRepository};
