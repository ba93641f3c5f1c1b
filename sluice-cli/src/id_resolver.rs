//! ID resolver module
//!
//! Resolves run ID prefixes to full UUIDs by querying the orchestrator, so
//! users can type a short unambiguous prefix instead of a full UUID.

use anyhow::{Context, Result, anyhow};
use sluice_client::OrchestratorClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a run ID or prefix to a full UUID
///
/// Full UUIDs are returned without contacting the orchestrator.
///
/// # Errors
/// Returns an error if no run or more than one run matches, or if the
/// API call fails
pub async fn resolve_run_id(client: &OrchestratorClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let runs = client
        .list_runs()
        .await
        .context("Failed to fetch runs for ID resolution")?;

    select_match(&id_or_prefix, runs.iter().map(|run| run.id))
}

fn select_match(id_or_prefix: &IdOrPrefix, ids: impl Iterator<Item = Uuid>) -> Result<Uuid> {
    let matches: Vec<Uuid> = ids.filter(|id| id_or_prefix.matches(*id)).collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No run found with ID starting with '{}'",
            id_or_prefix
        )),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple runs: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<Uuid> {
        [
            "4b825dc6-42cb-4eb9-a060-e54bf8d69288",
            "4b8f0000-0000-4000-8000-000000000000",
            "c0ffee00-0000-4000-8000-000000000000",
        ]
        .iter()
        .map(|s| Uuid::parse_str(s).unwrap())
        .collect()
    }

    #[test]
    fn test_unique_prefix_resolves() {
        let id = select_match(&IdOrPrefix::parse("c0f"), ids().into_iter()).unwrap();
        assert_eq!(id, ids()[2]);
    }

    #[test]
    fn test_ambiguous_prefix_is_rejected() {
        let err = select_match(&IdOrPrefix::parse("4b8"), ids().into_iter()).unwrap_err();
        assert!(err.to_string().contains("Ambiguous prefix '4b8'"));
    }

    #[test]
    fn test_unknown_prefix_is_rejected() {
        let err = select_match(&IdOrPrefix::parse("dead"), ids().into_iter()).unwrap_err();
        assert!(err.to_string().contains("No run found"));
    }
}
