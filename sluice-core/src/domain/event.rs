//! Trigger events
//!
//! Events delivered by the hosting platform (or a user) that start a run.

use serde::{Deserialize, Serialize};

/// Event that starts a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    PullRequest(PullRequestEvent),
    Manual(ManualEvent),
}

/// Pull-request creation/update on the hosting platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    pub number: u64,
    /// Repository identifier: `owner/name`, clone URL or local path
    pub repository: String,
    /// Commit that triggered the event
    pub head_sha: String,
    pub head_ref: String,
    pub base_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Synchronize,
    Reopened,
    Edited,
    Closed,
}

impl std::fmt::Display for PullRequestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PullRequestAction::Opened => "opened",
            PullRequestAction::Synchronize => "synchronize",
            PullRequestAction::Reopened => "reopened",
            PullRequestAction::Edited => "edited",
            PullRequestAction::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for PullRequestAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opened" => Ok(PullRequestAction::Opened),
            "synchronize" => Ok(PullRequestAction::Synchronize),
            "reopened" => Ok(PullRequestAction::Reopened),
            "edited" => Ok(PullRequestAction::Edited),
            "closed" => Ok(PullRequestAction::Closed),
            other => Err(format!("unknown pull request action '{}'", other)),
        }
    }
}

/// On-demand run of a repository at a ref
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEvent {
    pub repository: String,
    pub git_ref: String,
}

impl TriggerEvent {
    /// Repository and ref of the invoking repository at its triggering commit
    pub fn checkout_target(&self) -> (&str, &str) {
        match self {
            TriggerEvent::PullRequest(pr) => (&pr.repository, &pr.head_sha),
            TriggerEvent::Manual(manual) => (&manual.repository, &manual.git_ref),
        }
    }

    /// Short human-readable description used in logs
    pub fn describe(&self) -> String {
        match self {
            TriggerEvent::PullRequest(pr) => format!(
                "pull_request #{} ({}) {}@{}",
                pr.number, pr.action, pr.repository, pr.head_sha
            ),
            TriggerEvent::Manual(manual) => {
                format!("manual {}@{}", manual.repository, manual.git_ref)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_target_uses_head_sha() {
        let event = TriggerEvent::PullRequest(PullRequestEvent {
            action: PullRequestAction::Synchronize,
            number: 12,
            repository: "acme/app".to_string(),
            head_sha: "0123abcd".to_string(),
            head_ref: "feature/x".to_string(),
            base_ref: "main".to_string(),
        });
        assert_eq!(event.checkout_target(), ("acme/app", "0123abcd"));
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::json!({
            "type": "pull_request",
            "action": "opened",
            "number": 3,
            "repository": "acme/app",
            "head_sha": "deadbeef",
            "head_ref": "topic",
            "base_ref": "main"
        });

        let event: TriggerEvent = serde_json::from_value(json).unwrap();
        match event {
            TriggerEvent::PullRequest(pr) => {
                assert_eq!(pr.action, PullRequestAction::Opened);
                assert_eq!(pr.number, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(
            "synchronize".parse::<PullRequestAction>(),
            Ok(PullRequestAction::Synchronize)
        );
        assert!("merged".parse::<PullRequestAction>().is_err());
    }
}
