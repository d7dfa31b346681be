//! Callback encoding
//!
//! The outcome of a trigger is appended as query parameters to either the
//! `on-success` or the `on-error` URL of the request.

use serde::{Deserialize, Serialize};

use crate::ast::TriggerRequest;
use crate::error::ParseError;

/// Number of hex characters reported for a commit id
pub const SHORT_SHA_LEN: usize = 7;

/// Overall outcome reported to the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Error => "error",
        }
    }
}

/// Result of a dispatched trigger, ready to be encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub status: Outcome,
    pub sha: Option<String>,
    pub branch: Option<String>,
    pub changes: Option<usize>,
    pub message: Option<String>,
}

impl TriggerResponse {
    /// A successful response with no fields set yet
    pub fn ok() -> Self {
        Self {
            status: Outcome::Ok,
            sha: None,
            branch: None,
            changes: None,
            message: None,
        }
    }

    /// A failed response carrying an error message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Outcome::Error,
            sha: None,
            branch: None,
            changes: None,
            message: Some(message.into()),
        }
    }

    pub fn with_sha(mut self, sha: impl AsRef<str>) -> Self {
        self.sha = Some(short_sha(sha.as_ref()));
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_changes(mut self, changes: usize) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Build the URL the caller should activate for this response
    pub fn callback_url(&self, request: &TriggerRequest) -> Result<String, ParseError> {
        let base = match self.status {
            Outcome::Ok => &request.on_success,
            Outcome::Error => &request.on_error,
        };
        let mut url = url::Url::parse(base)?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("status", self.status.as_str());
            if let Some(ref sha) = self.sha {
                pairs.append_pair("sha", sha);
            }
            if let Some(ref branch) = self.branch {
                pairs.append_pair("branch", branch);
            }
            if let Some(changes) = self.changes {
                pairs.append_pair("changes", &changes.to_string());
            }
            if let Some(ref message) = self.message {
                pairs.append_pair("message", message);
            }
        }

        Ok(url.into())
    }
}

/// Truncate a commit id to its short form
pub fn short_sha(sha: &str) -> String {
    sha.chars().take(SHORT_SHA_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Action;

    fn request() -> TriggerRequest {
        TriggerRequest {
            scheme: "worksync".into(),
            action: Action::Status,
            repo: "notes".into(),
            on_success: "shortcuts://done?id=1".into(),
            on_error: "shortcuts://failed".into(),
            message: None,
        }
    }

    #[test]
    fn test_success_callback_keeps_existing_query() {
        let resp = TriggerResponse::ok()
            .with_sha("0123456789abcdef0123456789abcdef01234567")
            .with_branch("main")
            .with_changes(3);
        let url = resp.callback_url(&request()).unwrap();
        assert_eq!(
            url,
            "shortcuts://done?id=1&status=ok&sha=0123456&branch=main&changes=3"
        );
    }

    #[test]
    fn test_error_callback_encodes_message() {
        let resp = TriggerResponse::error("push rejected: pull first");
        let url = resp.callback_url(&request()).unwrap();
        assert_eq!(
            url,
            "shortcuts://failed?status=error&message=push+rejected%3A+pull+first"
        );
    }

    #[test]
    fn test_invalid_callback_url() {
        let mut req = request();
        req.on_success = "not a url".into();
        assert!(TriggerResponse::ok().callback_url(&req).is_err());
    }
}
