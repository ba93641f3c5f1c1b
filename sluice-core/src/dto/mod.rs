//! Data Transfer Objects for the orchestrator API
//!
//! DTOs are lightweight representations of domain entities optimized for
//! network transfer between the orchestrator, the client and the CLI.

pub mod run;
