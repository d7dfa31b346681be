//! Persisted repository records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::git::{Baseline, DEFAULT_BRANCH};

/// One managed repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    /// Registry id, also the checkout directory name
    pub id: String,
    /// Working directory; owns the object database once cloned
    pub local_path: PathBuf,
    /// Normalized remote address
    pub remote_url: String,
    /// Branch requested at clone time (remote default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Last known synchronized position of a repository
///
/// Empty until the first clone; replaced wholesale after every successful
/// operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Last commit observed locally (40 hex chars)
    #[serde(default)]
    pub commit_id: String,
    /// Root tree at last sync
    #[serde(default)]
    pub tree_id: String,
    /// Tracked branch
    #[serde(default)]
    pub branch_name: String,
    /// Repo-relative path -> blob id at last sync
    #[serde(default)]
    pub blob_hashes: BTreeMap<String, String>,
    /// Last successful pull or push
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    /// Change count last reported to the user
    #[serde(default)]
    pub change_count: usize,
}

impl SyncState {
    pub fn is_empty(&self) -> bool {
        *self == SyncState::default()
    }

    /// Branch to show when nothing has been recorded yet
    pub fn branch_or_default(&self) -> &str {
        if self.branch_name.is_empty() {
            DEFAULT_BRANCH
        } else {
            &self.branch_name
        }
    }

    /// Record a successful operation
    pub fn record(
        &mut self,
        commit_id: impl Into<String>,
        branch: impl Into<String>,
        baseline: Baseline,
    ) {
        self.commit_id = commit_id.into();
        self.branch_name = branch.into();
        self.tree_id = baseline.tree_id.unwrap_or_default();
        self.blob_hashes = baseline.blob_hashes;
        self.last_sync = Some(Utc::now());
        self.change_count = 0;
    }
}
