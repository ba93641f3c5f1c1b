//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between the runner and the repository.

pub mod run;

// Re-export for convenience
pub use run as run_service;
