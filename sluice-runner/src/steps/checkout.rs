//! Checkout steps
//!
//! Fetches exactly one commit into the workspace. The ref is resolved against
//! the remote every time the step runs; nothing is cached between runs, so a
//! branch name yields whatever that branch points to at that moment.

use sluice_core::domain::event::TriggerEvent;
use sluice_core::domain::workflow::{CheckoutSpec, DEFAULT_CHECKOUT_REF, StepDefinition};
use sluice_core::error::StepError;

use super::exec_checked;
use crate::config::RunnerConfig;
use crate::context::JobContext;
use crate::environment::{Environment, ExecRequest};

pub async fn checkout(
    environment: &dyn Environment,
    context: &JobContext,
    config: &RunnerConfig,
    step: &StepDefinition,
    spec: &CheckoutSpec,
    event: &TriggerEvent,
) -> Result<(), StepError> {
    let (repository, git_ref) = match &spec.repository {
        None => {
            let (repository, git_ref) = event.checkout_target();
            (repository.to_string(), git_ref.to_string())
        }
        Some(repository) => (
            repository.clone(),
            spec.git_ref
                .clone()
                .unwrap_or_else(|| DEFAULT_CHECKOUT_REF.to_string()),
        ),
    };

    let url = config.repository_url(&repository);
    let destination = spec.path.clone().unwrap_or_else(|| ".".to_string());
    let env = context.env_with(&step.env);

    let failed = |message: String| StepError::Checkout {
        repository: repository.clone(),
        git_ref: git_ref.clone(),
        message,
    };
    let git = |args: &[&str], cwd: Option<&str>| {
        ExecRequest::new("git")
            .args(args.iter().copied())
            .cwd(cwd.map(str::to_string))
            .envs(env.clone())
    };

    context.log_info(format!(
        "Checking out {}@{} into {}",
        repository, git_ref, destination
    ));

    exec_checked(environment, context, git(&["init", "-q", destination.as_str()], None))
        .await
        .map_err(&failed)?;

    exec_checked(
        environment,
        context,
        git(
            &["fetch", "-q", "--depth", "1", url.as_str(), git_ref.as_str()],
            Some(&destination),
        ),
    )
    .await
    .map_err(&failed)?;

    exec_checked(
        environment,
        context,
        git(&["checkout", "-q", "--detach", "FETCH_HEAD"], Some(&destination)),
    )
    .await
    .map_err(&failed)?;

    let head = exec_checked(
        environment,
        context,
        git(&["rev-parse", "HEAD"], Some(&destination)),
    )
    .await
    .map_err(&failed)?;
    let sha = head.stdout.trim();

    if is_commit_sha(&git_ref) {
        context.log_info(format!("Checked out {} at {}", repository, sha));
    } else {
        context.log_info(format!(
            "Checked out {} at {} (floating ref '{}' resolved at run time)",
            repository, sha, git_ref
        ));
    }

    Ok(())
}

/// Whether a ref names a commit rather than a movable branch or tag
fn is_commit_sha(git_ref: &str) -> bool {
    git_ref.len() == 40 && git_ref.chars().all(|c| c.is_ascii_hexdigit())
}
