use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod repository;
pub mod service;

use config::OrchestratorConfig;
use service::run_service::RunService;
use sluice_runner::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sluice_orchestrator=debug,sluice_runner=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sluice Orchestrator...");

    let config = OrchestratorConfig::from_env().context("Failed to load configuration")?;
    config.validate()?;

    let source = tokio::fs::read_to_string(&config.workflow_path)
        .await
        .with_context(|| format!("Failed to read {}", config.workflow_path.display()))?;
    let workflow = sluice_lua::parse_workflow(&source)
        .with_context(|| format!("Invalid workflow {}", config.workflow_path.display()))?;

    tracing::info!(
        "Loaded workflow '{}' with {} job(s)",
        workflow.name,
        workflow.jobs.len()
    );

    let scheduler = Scheduler::from_config(config.runner.clone())?;
    tracing::info!(
        "Jobs run with {:?} isolation under {}",
        config.runner.isolation,
        config.runner.workspace_base.display()
    );

    // Build router with all API endpoints
    let app = api::create_router(Arc::new(RunService::new(
        workflow,
        scheduler,
        config.max_runs,
    )));

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Server terminated")?;

    Ok(())
}
