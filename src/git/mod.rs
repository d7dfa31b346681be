//! Git backend for worksync
//!
//! Owns the on-disk object database of one working copy for the duration of
//! an operation.
//!
//! # Lifecycle
//!
//! 1. **Clone**: a fresh directory receives a full clone of the remote branch.
//! 2. **Pull**: fetch, then fast-forward the local branch to the remote tip.
//! 3. **Commit and push**: snapshot the whole working tree into one commit
//!    on top of HEAD and push it without force.
//!
//! A directory counts as cloned only while its `.git` directory exists and
//! opens as a repository.

use git2::build::RepoBuilder;
use git2::{
    ErrorCode, FetchOptions, ObjectType, Oid, Repository as Git2Repo, StatusOptions,
    TreeWalkMode, TreeWalkResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::changes;
use crate::error::{Error, Result};
use crate::validation::normalize_remote;

pub mod credentials;
pub mod hash;
mod sync;
pub mod transport;

pub use credentials::{CredentialProvider, Credentials};
pub use transport::Timeouts;

/// Directory whose presence marks a cloned working copy
pub const STORE_MARKER: &str = ".git";

/// Remote every working copy tracks
pub const REMOTE_NAME: &str = "origin";

/// Branch assumed when HEAD is detached or unreadable
pub const DEFAULT_BRANCH: &str = "main";

/// Tree entry mode of symbolic links
const SYMLINK_MODE: i32 = 0o120000;

/// Result of a successful clone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOutcome {
    pub commit_id: String,
    pub branch: String,
    pub file_count: usize,
}

/// Result of a pull
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullOutcome {
    pub updated: bool,
    pub new_commit_id: String,
}

/// Result of a commit-and-push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOutcome {
    pub new_commit_id: String,
}

/// Branch, tip and pending change count of a working copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusOutcome {
    pub branch: String,
    pub commit_id: String,
    pub change_count: usize,
}

/// Commit author, also used as committer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Blob ids of the HEAD tree, the baseline for hash-based change detection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    pub tree_id: Option<String>,
    pub blob_hashes: BTreeMap<String, String>,
}

/// Where HEAD points
#[derive(Debug, Clone)]
pub(crate) struct Head {
    pub branch: String,
    pub commit: Option<Oid>,
    /// HEAD points at a commit instead of a branch
    pub detached: bool,
}

impl Head {
    fn commit_id(&self) -> String {
        self.commit.unwrap_or_else(Oid::zero).to_string()
    }
}

/// Check whether `path` holds a usable working copy
pub fn has_valid_store(path: &Path) -> bool {
    path.join(STORE_MARKER).is_dir() && Git2Repo::open(path).is_ok()
}

/// Git repository wrapper for one working copy
pub struct Repository {
    root: PathBuf,
    inner: Git2Repo,
}

impl Repository {
    /// Open an existing working copy; never creates one
    pub fn open(path: &Path) -> Result<Self> {
        if !path.join(STORE_MARKER).is_dir() {
            return Err(Error::NotCloned {
                path: path.to_path_buf(),
            });
        }

        let inner = Git2Repo::open(path).map_err(|e| Error::StoreCorrupted {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;

        Ok(Self {
            root: path.to_path_buf(),
            inner,
        })
    }

    /// Clone `remote_url` into `dest`, which must not exist yet
    ///
    /// A failed clone removes whatever it wrote, so `dest` never reports
    /// itself as cloned afterwards.
    pub fn clone_from(
        remote_url: &str,
        dest: &Path,
        branch: Option<&str>,
        credentials: Credentials,
        timeouts: Timeouts,
    ) -> Result<(Self, CloneOutcome)> {
        let url = normalize_remote(remote_url)?;

        if dest.exists() {
            return Err(Error::CloneFailed {
                path: dest.to_path_buf(),
                message: "destination already exists".into(),
            });
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::FileWriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        info!(%url, dest = ?dest, "cloning");
        let provider = CredentialProvider::new(credentials);
        let deadline = transport::Deadline::start(timeouts);

        let cloned = {
            let mut fetch = FetchOptions::new();
            fetch.remote_callbacks(transport::remote_callbacks(&provider, &deadline));

            let mut builder = RepoBuilder::new();
            builder.fetch_options(fetch);
            if let Some(branch) = branch {
                builder.branch(branch);
            }
            builder.clone(&url, dest)
        };

        let inner = match cloned {
            Ok(repo) => repo,
            Err(e) => {
                if dest.exists() {
                    if let Err(cleanup) = std::fs::remove_dir_all(dest) {
                        warn!(dest = ?dest, error = %cleanup, "could not remove partial clone");
                    }
                }
                return Err(transport::classify("clone", e, &provider, &deadline));
            }
        };

        let repo = Self {
            root: dest.to_path_buf(),
            inner,
        };
        let head = repo.head()?;
        let outcome = CloneOutcome {
            commit_id: head.commit_id(),
            branch: head.branch,
            file_count: changes::visible_files(dest).count(),
        };

        info!(
            commit = %outcome.commit_id,
            branch = %outcome.branch,
            files = outcome.file_count,
            "clone complete"
        );
        Ok((repo, outcome))
    }

    /// Current branch and tip
    pub(crate) fn head(&self) -> Result<Head> {
        match self.inner.head() {
            Ok(reference) => {
                let detached = !reference.is_branch();
                let branch = if detached {
                    DEFAULT_BRANCH.to_string()
                } else {
                    reference.shorthand().unwrap_or(DEFAULT_BRANCH).to_string()
                };
                let commit = reference
                    .peel_to_commit()
                    .map_err(|e| self.corrupted(e))?
                    .id();
                Ok(Head {
                    branch,
                    commit: Some(commit),
                    detached,
                })
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                // Empty repository: HEAD names a branch with no commits yet
                let branch = self
                    .inner
                    .find_reference("HEAD")
                    .ok()
                    .and_then(|r| r.symbolic_target().map(str::to_string))
                    .and_then(|t| t.strip_prefix("refs/heads/").map(str::to_string))
                    .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
                Ok(Head {
                    branch,
                    commit: None,
                    detached: false,
                })
            }
            Err(e) => Err(self.corrupted(e)),
        }
    }

    /// HEAD, which must name a branch for operations that move one
    pub(crate) fn attached_head(&self) -> Result<Head> {
        let head = self.head()?;
        if head.detached {
            return Err(Error::DetachedHead {
                path: self.root.clone(),
            });
        }
        Ok(head)
    }

    /// Count entries that differ between HEAD, the index and the working
    /// tree, untracked files included
    pub fn status(&self) -> Result<StatusOutcome> {
        let head = self.head()?;

        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.inner.statuses(Some(&mut opts))?;

        Ok(StatusOutcome {
            commit_id: head.commit_id(),
            branch: head.branch,
            change_count: statuses.len(),
        })
    }

    /// Blob ids of every non-hidden file in the HEAD tree
    pub fn baseline(&self) -> Result<Baseline> {
        let head = self.head()?;
        let Some(commit_id) = head.commit else {
            return Ok(Baseline::default());
        };

        let tree = self.inner.find_commit(commit_id)?.tree()?;
        let mut blob_hashes = BTreeMap::new();

        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            let Some(name) = entry.name() else {
                return TreeWalkResult::Skip;
            };
            if changes::is_hidden_name(name) {
                return TreeWalkResult::Skip;
            }
            if entry.kind() == Some(ObjectType::Blob) && entry.filemode() != SYMLINK_MODE {
                blob_hashes.insert(format!("{}{}", dir, name), entry.id().to_string());
            }
            TreeWalkResult::Ok
        })?;

        debug!(files = blob_hashes.len(), "computed baseline");
        Ok(Baseline {
            tree_id: Some(tree.id().to_string()),
            blob_hashes,
        })
    }

    fn corrupted(&self, err: git2::Error) -> Error {
        Error::StoreCorrupted {
            path: self.root.clone(),
            message: err.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_with_commit(path: &Path) -> Git2Repo {
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Git2Repo::init_opts(path, &opts).unwrap();
        std::fs::write(path.join("a.md"), "# A").unwrap();
        std::fs::create_dir_all(path.join("sub")).unwrap();
        std::fs::write(path.join("sub/b.md"), "# B").unwrap();
        std::fs::write(path.join(".hidden"), "secret").unwrap();
        {
            let mut index = repo.index().unwrap();
            index
                .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
                .unwrap();
            index.add_path(Path::new(".hidden")).unwrap();
            index.write().unwrap();
            let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
            let sig = git2::Signature::now("Test", "test@example.com").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn test_open_requires_marker() {
        let tmp = TempDir::new().unwrap();
        let err = Repository::open(tmp.path()).err().unwrap();
        assert!(matches!(err, Error::NotCloned { .. }));
        assert!(!has_valid_store(tmp.path()));
    }

    #[test]
    fn test_corrupted_store() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join(STORE_MARKER)).unwrap();
        let err = Repository::open(tmp.path()).err().unwrap();
        assert!(matches!(err, Error::StoreCorrupted { .. }));
        assert!(!has_valid_store(tmp.path()));
    }

    #[test]
    fn test_head_and_status() {
        let tmp = TempDir::new().unwrap();
        init_with_commit(tmp.path());
        let repo = Repository::open(tmp.path()).unwrap();

        let status = repo.status().unwrap();
        assert_eq!(status.branch, "main");
        assert_eq!(status.commit_id.len(), 40);
        assert_eq!(status.change_count, 0);

        std::fs::write(tmp.path().join("a.md"), "# A edited").unwrap();
        std::fs::create_dir_all(tmp.path().join("new/deep")).unwrap();
        std::fs::write(tmp.path().join("new/deep/c.md"), "# C").unwrap();
        assert_eq!(repo.status().unwrap().change_count, 2);
    }

    #[test]
    fn test_unborn_head() {
        let tmp = TempDir::new().unwrap();
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("main");
        Git2Repo::init_opts(tmp.path(), &opts).unwrap();

        let repo = Repository::open(tmp.path()).unwrap();
        let head = repo.head().unwrap();
        assert_eq!(head.branch, "main");
        assert!(head.commit.is_none());
        assert!(!head.detached);
        assert_eq!(head.commit_id(), Oid::zero().to_string());
        assert_eq!(repo.baseline().unwrap(), Baseline::default());
    }

    #[test]
    fn test_detached_head_is_rejected_for_branch_operations() {
        let tmp = TempDir::new().unwrap();
        let git = init_with_commit(tmp.path());
        let tip = git.head().unwrap().peel_to_commit().unwrap().id();
        git.set_head_detached(tip).unwrap();

        let repo = Repository::open(tmp.path()).unwrap();
        let head = repo.head().unwrap();
        assert!(head.detached);
        assert_eq!(head.commit, Some(tip));
        assert!(matches!(repo.attached_head(), Err(Error::DetachedHead { .. })));
        // Read-only status still works
        assert_eq!(repo.status().unwrap().commit_id, tip.to_string());
    }

    #[test]
    fn test_baseline_skips_hidden_paths() {
        let tmp = TempDir::new().unwrap();
        init_with_commit(tmp.path());
        let repo = Repository::open(tmp.path()).unwrap();

        let baseline = repo.baseline().unwrap();
        assert!(baseline.tree_id.is_some());
        assert_eq!(baseline.blob_hashes.len(), 2);
        assert_eq!(baseline.blob_hashes["a.md"], hash::blob_hash(b"# A"));
        assert_eq!(baseline.blob_hashes["sub/b.md"], hash::blob_hash(b"# B"));
        assert!(!baseline.blob_hashes.contains_key(".hidden"));
    }

    #[test]
    fn test_clone_into_existing_destination_fails() {
        let tmp = TempDir::new().unwrap();
        let err = Repository::clone_from(
            "/nonexistent/remote",
            tmp.path(),
            None,
            Credentials::new("u", "p"),
            Timeouts::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::CloneFailed { .. }));
    }

    #[test]
    fn test_clone_rejects_invalid_remote() {
        let tmp = TempDir::new().unwrap();
        let err = Repository::clone_from(
            "not a remote",
            &tmp.path().join("dest"),
            None,
            Credentials::new("u", "p"),
            Timeouts::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::InvalidRemote { .. }));
        assert!(!tmp.path().join("dest").exists());
    }
}
