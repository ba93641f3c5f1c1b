//! Sluice Lua Infrastructure
//!
//! Workflows are declared in Lua. This crate provides:
//! - A restricted sandbox with the `workflow` helper module
//! - The parser turning a definition into a validated `Workflow`

pub mod parser;
pub mod sandbox;

pub use parser::parse_workflow;
pub use sandbox::create_sandbox;
