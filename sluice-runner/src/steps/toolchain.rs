//! Toolchain steps
//!
//! Rust toolchains are installed through rustup and selected for the rest of
//! the job via `RUSTUP_TOOLCHAIN`. Java is probed: the environment must
//! already provide the requested major version.

use sluice_core::domain::workflow::{JobDefinition, StepDefinition, ToolchainKind, ToolchainSpec};
use sluice_core::error::StepError;

use super::exec_checked;
use crate::context::JobContext;
use crate::environment::{Environment, ExecRequest};

pub async fn setup_toolchain(
    environment: &dyn Environment,
    context: &JobContext,
    job: &JobDefinition,
    step: &StepDefinition,
    spec: &ToolchainSpec,
) -> Result<(), StepError> {
    let channel = job
        .resolve_channel(spec)
        .ok_or_else(|| StepError::Toolchain {
            toolchain: spec.kind.to_string(),
            message: "no channel declared on the step or the job".to_string(),
        })?;

    match spec.kind {
        ToolchainKind::Rust => {
            setup_rust(environment, context, step, channel, &spec.components).await
        }
        ToolchainKind::Java => setup_java(environment, context, step, channel).await,
    }
}

async fn setup_rust(
    environment: &dyn Environment,
    context: &JobContext,
    step: &StepDefinition,
    channel: &str,
    components: &[String],
) -> Result<(), StepError> {
    let unavailable = |message: String| StepError::Toolchain {
        toolchain: format!("rust {}", channel),
        message,
    };

    context.log_info(format!("Installing rust toolchain {}", channel));

    let mut install = ExecRequest::new("rustup").args([
        "toolchain",
        "install",
        channel,
        "--profile",
        "minimal",
        "--no-self-update",
    ]);
    for component in components {
        install = install.args(["--component", component.as_str()]);
    }

    exec_checked(environment, context, install.envs(context.env_with(&step.env)))
        .await
        .map_err(&unavailable)?;

    context.export("RUSTUP_TOOLCHAIN", channel);

    let version = exec_checked(
        environment,
        context,
        ExecRequest::new("rustc")
            .arg("--version")
            .envs(context.env_with(&step.env)),
    )
    .await
    .map_err(&unavailable)?;

    context.log_info(format!("Using {}", version.stdout.trim()));
    Ok(())
}

async fn setup_java(
    environment: &dyn Environment,
    context: &JobContext,
    step: &StepDefinition,
    channel: &str,
) -> Result<(), StepError> {
    let unavailable = |message: String| StepError::Toolchain {
        toolchain: format!("java {}", channel),
        message,
    };

    let wanted = major_version(channel)
        .ok_or_else(|| unavailable(format!("'{}' is not a java version", channel)))?;

    let output = exec_checked(
        environment,
        context,
        ExecRequest::new("java")
            .arg("-version")
            .envs(context.env_with(&step.env)),
    )
    .await
    .map_err(&unavailable)?;

    // java -version reports on stderr
    let banner = if output.stderr.trim().is_empty() {
        &output.stdout
    } else {
        &output.stderr
    };

    let found = parse_java_version(banner).ok_or_else(|| {
        unavailable(format!(
            "could not determine version from '{}'",
            banner.lines().next().unwrap_or_default().trim()
        ))
    })?;

    if found != wanted {
        return Err(unavailable(format!(
            "found java {} but {} was requested",
            found, channel
        )));
    }

    context.log_info(format!("Using java {}", found));
    Ok(())
}

/// Major version from a `java -version` banner, e.g. `openjdk version "17.0.9"`
fn parse_java_version(banner: &str) -> Option<u32> {
    let start = banner.find('"')? + 1;
    let end = start + banner[start..].find('"')?;
    major_version(&banner[start..end])
}

/// `17`, `17.0.9` -> 17; legacy `1.8.0_392` -> 8
fn major_version(version: &str) -> Option<u32> {
    let mut parts = version.trim().split(['.', '_', '-', '+']);
    let first = parts.next()?;
    let major = if first == "1" { parts.next()? } else { first };
    major.parse().ok()
}
