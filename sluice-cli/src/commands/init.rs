//! Init command handler
//!
//! Writes a starter workflow that checks out the invoking repository, sets
//! up Rust and runs the usual cargo checks.

use anyhow::{Context, Result, bail};
use colored::*;
use std::fs;
use std::path::Path;

const STARTER_WORKFLOW: &str = r#"-- Runs on every opened, updated or reopened pull request.
return workflow.define {
    name = "CI",
    on = { "pull_request" },
    env = { CARGO_TERM_COLOR = "always" },

    jobs = {
        {
            name = "build",
            runs_on = "ubuntu-latest",
            toolchain = "stable",
            steps = {
                workflow.checkout { name = "checkout" },
                workflow.toolchain(nil, { components = { "rustfmt" } }),
                workflow.run("cargo fmt --all -- --check", { name = "cargo fmt" }),
                workflow.run("cargo build", { name = "cargo build" }),
                workflow.run("cargo test --verbose", { name = "cargo test" }),
            },
        },
    },
}
"#;

/// Write `workflow.lua` into `output_dir`
pub fn generate_workflow(output_dir: &str, force: bool) -> Result<()> {
    let path = Path::new(output_dir).join("workflow.lua");

    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create directory {}", output_dir))?;
    fs::write(&path, STARTER_WORKFLOW)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("  {} {}", "Created".green(), path.display());
    println!();
    println!("{}", "Next steps:".bold());
    println!(
        "  1. Check it with {}",
        format!("sluice workflow validate {}", path.display()).cyan()
    );
    println!(
        "  2. Run it locally with {}",
        format!("sluice workflow run {}", path.display()).cyan()
    );

    Ok(())
}
