//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod init;
mod run;
mod workflow;

pub use run::RunCommands;
pub use workflow::WorkflowCommands;

use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Validate and run workflow files locally
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommands,
    },
    /// Runs on a remote orchestrator
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Write a starter workflow.lua
    Init {
        /// Output directory for the generated file
        #[arg(short, long, default_value = ".")]
        output: String,

        /// Overwrite an existing workflow.lua
        #[arg(long)]
        force: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Workflow { command } => workflow::handle_workflow_command(command).await,
        Commands::Run { command } => run::handle_run_command(command, config)
            .await
            .map(|()| ExitCode::SUCCESS),
        Commands::Init { output, force } => {
            init::generate_workflow(&output, force).map(|()| ExitCode::SUCCESS)
        }
    }
}
