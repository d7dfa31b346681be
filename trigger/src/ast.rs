//! Parsed representation of a trigger URL

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of actions a trigger can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Fetch and fast-forward
    Pull,
    /// Commit everything and push
    Push,
    /// Pull followed by push
    Sync,
    /// Report branch, commit and change count
    Status,
}

impl Action {
    /// Resolve an action name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pull" => Some(Action::Pull),
            "push" => Some(Action::Push),
            "sync" => Some(Action::Sync),
            "status" => Some(Action::Status),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Pull => "pull",
            Action::Push => "push",
            Action::Sync => "sync",
            Action::Status => "status",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete trigger request
///
/// ```text
/// worksync://trigger/<action>?repo=<id>&on-success=<url>&on-error=<url>[&message=<text>]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// URL scheme the request arrived on
    pub scheme: String,
    /// Requested action
    pub action: Action,
    /// Repository id
    pub repo: String,
    /// Callback activated when the action succeeds
    pub on_success: String,
    /// Callback activated when the action fails
    pub on_error: String,
    /// Commit message for push/sync
    pub message: Option<String>,
}
