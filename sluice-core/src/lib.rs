//! Sluice Core
//!
//! Core types and abstractions for the Sluice pipeline runner.
//!
//! This crate contains:
//! - Domain types: workflows, jobs, steps, runs, trigger events and logs
//! - DTOs: Data transfer objects for the orchestrator API
//! - Errors: the step error taxonomy and workflow validation errors

pub mod domain;
pub mod dto;
pub mod error;
