//! Workflow definition parser
//!
//! Evaluates a Lua workflow definition in the sandbox and converts the
//! returned table into a validated [`Workflow`].

use anyhow::{Context, Result, anyhow, bail};
use mlua::{Table, Value};
use sluice_core::domain::event::PullRequestAction;
use sluice_core::domain::workflow::{
    CheckoutSpec, JobDefinition, RunSpec, StepAction, StepDefinition, ToolchainKind,
    ToolchainSpec, Trigger, Workflow,
};
use std::collections::BTreeMap;

use crate::sandbox::create_sandbox;

/// Parse a workflow from Lua source code
///
/// # Errors
/// Returns an error if:
/// - The Lua source is invalid or does not return a table
/// - Required fields are missing (name, jobs, runs_on, steps)
/// - A step declares zero or several of `checkout`, `toolchain`, `run`
/// - The resulting workflow fails validation
///
/// # Example
/// ```no_run
/// use sluice_lua::parser::parse_workflow;
///
/// let source = r#"
///     return workflow.define {
///         name = "CI",
///         on = { "pull_request" },
///         jobs = {
///             {
///                 name = "rust-hello-world",
///                 runs_on = "ubuntu-latest",
///                 toolchain = "stable",
///                 steps = {
///                     { checkout = true },
///                     { toolchain = "stable" },
///                     { name = "cargo test", run = "cargo test" },
///                 },
///             },
///         },
///     }
/// "#;
///
/// let workflow = parse_workflow(source)?;
/// assert_eq!(workflow.jobs[0].steps.len(), 3);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn parse_workflow(source: &str) -> Result<Workflow> {
    let lua = create_sandbox().context("Failed to create workflow sandbox")?;

    let definition: Table = lua
        .load(source)
        .set_name("workflow")
        .eval()
        .context("Failed to evaluate workflow definition")?;

    let name: String = definition
        .get::<Option<String>>("name")
        .context("Field 'name' must be a string")?
        .ok_or_else(|| anyhow!("Workflow must have a 'name' field"))?;

    let description: Option<String> = definition
        .get("description")
        .context("Field 'description' must be a string")?;

    let triggers = parse_triggers(&definition)?;
    let env = parse_env(&definition).context("Invalid workflow 'env'")?;
    let jobs = parse_jobs(&definition)?;

    let workflow = Workflow {
        name,
        description,
        triggers,
        env,
        jobs,
    };

    workflow.validate()?;

    Ok(workflow)
}

/// Parse the `on` field
///
/// Accepts `"pull_request"`, `{ "pull_request", "manual" }` or
/// `{ pull_request = { types = { "opened" } } }`. A missing field means
/// pull-request events with the default actions.
fn parse_triggers(definition: &Table) -> Result<Vec<Trigger>> {
    let value: Value = definition.get("on")?;

    match value {
        Value::Nil => Ok(vec![Trigger::PullRequest {
            actions: Vec::new(),
        }]),
        Value::String(name) => Ok(vec![trigger_from_name(&name.to_string_lossy(), Value::Nil)?]),
        Value::Table(table) => {
            let mut triggers = Vec::new();
            for pair in table.pairs::<Value, Value>() {
                let (key, config) = pair.context("Failed to read trigger entry")?;
                let trigger = match key {
                    Value::Integer(_) => match config {
                        Value::String(name) => trigger_from_name(&name.to_string_lossy(), Value::Nil)?,
                        _ => bail!("Entries of 'on' must be event names"),
                    },
                    Value::String(name) => trigger_from_name(&name.to_string_lossy(), config)?,
                    _ => bail!("Field 'on' has an invalid key"),
                };
                triggers.push(trigger);
            }
            Ok(triggers)
        }
        _ => bail!("Field 'on' must be a string or a table"),
    }
}

fn trigger_from_name(name: &str, config: Value) -> Result<Trigger> {
    match name {
        "pull_request" => {
            let actions = match config {
                Value::Nil | Value::Boolean(true) => Vec::new(),
                Value::Table(table) => match table.get::<Option<Table>>("types")? {
                    None => Vec::new(),
                    Some(types) => types
                        .sequence_values::<String>()
                        .map(|action| {
                            let action = action.context("Failed to read pull_request type")?;
                            action
                                .parse::<PullRequestAction>()
                                .map_err(|e| anyhow!(e))
                        })
                        .collect::<Result<Vec<_>>>()?,
                },
                _ => bail!("Trigger 'pull_request' must be true or a table"),
            };
            Ok(Trigger::PullRequest { actions })
        }
        "manual" => Ok(Trigger::Manual),
        other => bail!("Unsupported trigger '{}'", other),
    }
}

/// Parse an optional `env` table into string pairs
fn parse_env(table: &Table) -> Result<BTreeMap<String, String>> {
    let value: Value = table.get("env")?;

    match value {
        Value::Nil => Ok(BTreeMap::new()),
        Value::Table(env) => {
            let mut vars = BTreeMap::new();
            for pair in env.pairs::<String, Value>() {
                let (key, value) = pair.context("Failed to read env entry")?;
                let value = match value {
                    Value::String(s) => s.to_string_lossy(),
                    Value::Integer(i) => i.to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Boolean(b) => b.to_string(),
                    _ => bail!("Env variable '{}' must be a string, number or boolean", key),
                };
                vars.insert(key, value);
            }
            Ok(vars)
        }
        _ => bail!("Field 'env' must be a table"),
    }
}

/// Parse the `jobs` array
fn parse_jobs(definition: &Table) -> Result<Vec<JobDefinition>> {
    let jobs_table: Table = definition
        .get::<Option<Table>>("jobs")
        .context("Field 'jobs' must be an array of job tables")?
        .ok_or_else(|| anyhow!("Workflow must have a 'jobs' field"))?;

    ensure_sequence(&jobs_table, "jobs")?;

    let mut jobs = Vec::new();
    for (idx, job) in jobs_table.sequence_values::<Table>().enumerate() {
        let job = job.with_context(|| format!("Job {} must be a table", idx + 1))?;
        jobs.push(parse_job(idx, &job)?);
    }

    Ok(jobs)
}

fn parse_job(idx: usize, job: &Table) -> Result<JobDefinition> {
    let name: String = job
        .get::<Option<String>>("name")?
        .ok_or_else(|| anyhow!("Job {} must have a 'name' field", idx + 1))?;

    let runs_on: String = job
        .get::<Option<String>>("runs_on")?
        .ok_or_else(|| anyhow!("Job '{}' must have a 'runs_on' field", name))?;

    let toolchain: Option<String> = job
        .get("toolchain")
        .with_context(|| format!("Job '{}': 'toolchain' must be a string", name))?;

    let env = parse_env(job).with_context(|| format!("Job '{}' has invalid 'env'", name))?;

    let steps_table: Table = job
        .get::<Option<Table>>("steps")?
        .ok_or_else(|| anyhow!("Job '{}' must have a 'steps' field", name))?;

    ensure_sequence(&steps_table, "steps").with_context(|| format!("Job '{}'", name))?;

    let mut steps = Vec::new();
    for (step_idx, step) in steps_table.sequence_values::<Table>().enumerate() {
        let step =
            step.with_context(|| format!("Job '{}' step {} must be a table", name, step_idx + 1))?;
        let step = parse_step(&step)
            .with_context(|| format!("Job '{}' step {}", name, step_idx + 1))?;
        steps.push(step);
    }

    Ok(JobDefinition {
        name,
        runs_on,
        toolchain,
        env,
        steps,
    })
}

fn parse_step(step: &Table) -> Result<StepDefinition> {
    let checkout: Value = step.get("checkout")?;
    let toolchain: Value = step.get("toolchain")?;
    let run: Value = step.get("run")?;

    let declared = [&checkout, &toolchain, &run]
        .iter()
        .filter(|v| !v.is_nil())
        .count();
    if declared != 1 {
        bail!("exactly one of 'checkout', 'toolchain' or 'run' is required");
    }

    let action = if !checkout.is_nil() {
        StepAction::Checkout(parse_checkout(checkout)?)
    } else if !toolchain.is_nil() {
        StepAction::Toolchain(parse_toolchain(toolchain)?)
    } else {
        let command = match run {
            Value::String(command) => command.to_string_lossy(),
            _ => bail!("'run' must be a command string"),
        };
        let shell: Option<String> = step.get("shell").context("'shell' must be a string")?;
        StepAction::Run(RunSpec { command, shell })
    };

    let name: String = match step.get::<Option<String>>("name")? {
        Some(name) => name,
        None => default_step_name(&action),
    };

    let working_directory: Option<String> = step
        .get("working_directory")
        .context("'working_directory' must be a string")?;

    let env = parse_env(step)?;

    Ok(StepDefinition {
        name,
        working_directory,
        env,
        action,
    })
}

fn parse_checkout(value: Value) -> Result<CheckoutSpec> {
    match value {
        Value::Boolean(true) => Ok(CheckoutSpec::default()),
        Value::Table(spec) => Ok(CheckoutSpec {
            repository: spec.get("repository")?,
            git_ref: spec.get("ref")?,
            path: spec.get("path")?,
        }),
        _ => bail!("'checkout' must be true or a table"),
    }
}

fn parse_toolchain(value: Value) -> Result<ToolchainSpec> {
    match value {
        Value::String(channel) => Ok(ToolchainSpec {
            kind: ToolchainKind::Rust,
            channel: Some(channel.to_string_lossy()),
            components: Vec::new(),
        }),
        Value::Table(spec) => {
            let kind = match spec.get::<Option<String>>("kind")? {
                Some(kind) => kind.parse::<ToolchainKind>()?,
                None => ToolchainKind::Rust,
            };
            let components = match spec.get::<Option<Table>>("components")? {
                Some(list) => list
                    .sequence_values::<String>()
                    .collect::<mlua::Result<Vec<_>>>()
                    .context("'components' must be an array of strings")?,
                None => Vec::new(),
            };
            Ok(ToolchainSpec {
                kind,
                channel: spec.get("channel")?,
                components,
            })
        }
        _ => bail!("'toolchain' must be a channel string or a table"),
    }
}

fn default_step_name(action: &StepAction) -> String {
    match action {
        StepAction::Checkout(spec) => match &spec.repository {
            Some(repository) => format!("Checkout {}", repository),
            None => "Checkout".to_string(),
        },
        StepAction::Toolchain(spec) => format!("Set up {} toolchain", spec.kind),
        StepAction::Run(spec) => spec.command.clone(),
    }
}

/// Rejects tables with keys outside the array part, where order would be lost
fn ensure_sequence(table: &Table, field: &str) -> Result<()> {
    let total = table.pairs::<Value, Value>().count();
    if total != table.raw_len() {
        bail!("Field '{}' must be an array", field);
    }
    Ok(())
}
