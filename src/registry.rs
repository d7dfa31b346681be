//! Repository collection
//!
//! The registry is the caller-side half of every operation: it resolves an
//! id to its handle, allows one in-flight operation per repository, runs the
//! git work off the async threads and persists `SyncState` only after the
//! operation succeeded.
//!
//! The per-repository guard travels into the blocking task and back out, so
//! it is held until the resulting state has been written.
//!
//! Checkouts live under `<root>/repos/<id>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::changes::{self, ChangeSet};
use crate::engine::run_blocking;
use crate::error::{Error, Result};
use crate::git::{
    self, Author, CloneOutcome, Credentials, PullOutcome, PushOutcome, Repository, StatusOutcome,
    Timeouts,
};
use crate::storage::{MetadataStore, RepositoryHandle, SyncState, YamlStore};
use crate::validation::{id_from_remote, normalize_remote, validate_repository_id};

/// Result of a pull followed by a push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub pull: PullOutcome,
    /// `None` when there was nothing to commit
    pub push: Option<PushOutcome>,
}

impl SyncOutcome {
    /// Commit the working copy ends up on
    pub fn commit_id(&self) -> &str {
        self.push
            .as_ref()
            .map(|p| p.new_commit_id.as_str())
            .unwrap_or(&self.pull.new_commit_id)
    }
}

/// Registered repositories and their persisted state
pub struct Registry<S: MetadataStore = YamlStore> {
    root: PathBuf,
    store: S,
    /// Serializes read-modify-write cycles on the store
    metadata: AsyncMutex<()>,
    /// One lock per repository id
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Registry<YamlStore> {
    /// Open the registry kept in YAML files under `root`
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let store = YamlStore::new(&root);
        Self::with_store(root, store)
    }
}

impl<S: MetadataStore> Registry<S> {
    /// Use an explicit store; checkouts still go under `root`
    pub fn with_store(root: impl Into<PathBuf>, store: S) -> Self {
        Self {
            root: root.into(),
            store,
            metadata: AsyncMutex::new(()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a repository is checked out to
    pub fn checkout_path(&self, id: &str) -> PathBuf {
        self.root.join("repos").join(id)
    }

    // =========================================================================
    // Handles
    // =========================================================================

    /// Register a remote; the id defaults to the remote's last path segment
    pub async fn register(
        &self,
        id: Option<&str>,
        remote_url: &str,
        branch: Option<&str>,
    ) -> Result<RepositoryHandle> {
        let remote_url = normalize_remote(remote_url)?;
        let id = match id {
            Some(id) => id.to_string(),
            None => id_from_remote(&remote_url).ok_or_else(|| Error::InvalidRepositoryId {
                value: remote_url.clone(),
                reason: "cannot derive an id from the remote",
            })?,
        };
        validate_repository_id(&id)?;

        let _meta = self.metadata.lock().await;
        let mut handles = self.store.load_handles()?;
        if handles.iter().any(|h| h.id == id) {
            return Err(Error::RepositoryExists { id });
        }

        let handle = RepositoryHandle {
            local_path: self.checkout_path(&id),
            id,
            remote_url,
            branch: branch.map(str::to_string),
        };
        handles.push(handle.clone());
        self.store.save_handles(&handles)?;
        self.store.save_state(&handle.id, &SyncState::default())?;

        info!(id = %handle.id, remote = %handle.remote_url, "registered repository");
        Ok(handle)
    }

    /// Forget a repository, optionally deleting its checkout
    pub async fn unregister(&self, id: &str, delete_checkout: bool) -> Result<()> {
        let handle = self.get(id).await?;
        let _guard = self.lock(id).await;

        if delete_checkout && handle.local_path.exists() {
            tokio::fs::remove_dir_all(&handle.local_path)
                .await
                .map_err(|source| Error::FileWriteError {
                    path: handle.local_path.clone(),
                    source,
                })?;
        }

        let _meta = self.metadata.lock().await;
        let mut handles = self.store.load_handles()?;
        handles.retain(|h| h.id != id);
        self.store.save_handles(&handles)?;
        self.store.remove_state(id)?;

        info!(%id, "unregistered repository");
        Ok(())
    }

    /// Look up one handle
    pub async fn get(&self, id: &str) -> Result<RepositoryHandle> {
        self.store
            .load_handles()?
            .into_iter()
            .find(|h| h.id == id)
            .ok_or_else(|| Error::RepositoryNotFound { id: id.to_string() })
    }

    /// All handles in registration order
    pub async fn list(&self) -> Result<Vec<RepositoryHandle>> {
        self.store.load_handles()
    }

    /// Persisted state of one repository
    pub async fn state(&self, id: &str) -> Result<SyncState> {
        self.get(id).await?;
        self.store.load_state(id)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Re-check that the checkout still exists
    ///
    /// When the object database has disappeared (deleted from outside), the
    /// recorded state is meaningless and is reset to empty. Returns whether
    /// the repository is cloned.
    pub async fn validate(&self, id: &str) -> Result<bool> {
        let handle = self.get(id).await?;
        let _guard = self.lock(id).await;

        let path = handle.local_path.clone();
        let cloned = run_blocking(move || Ok(git::has_valid_store(&path))).await?;
        if cloned {
            return Ok(true);
        }

        self.update_state(id, |state| {
            if !state.is_empty() {
                warn!(%id, path = ?handle.local_path, "working copy is gone, resetting state");
                *state = SyncState::default();
            }
        })
        .await?;
        Ok(false)
    }

    /// Validate every registered repository
    pub async fn validate_all(&self) -> Result<Vec<(String, bool)>> {
        let mut results = Vec::new();
        for handle in self.list().await? {
            let cloned = self.validate(&handle.id).await?;
            results.push((handle.id, cloned));
        }
        Ok(results)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Clone a registered repository
    ///
    /// A leftover directory without a usable store is removed first. The
    /// state is only written once the clone has fully succeeded.
    pub async fn clone(
        &self,
        id: &str,
        credentials: Credentials,
        timeouts: Timeouts,
    ) -> Result<CloneOutcome> {
        let handle = self.get(id).await?;
        let guard = self.lock(id).await;

        let (outcome, baseline, _guard) = run_blocking(move || {
            let dest = &handle.local_path;

            if git::has_valid_store(dest) {
                return Err(Error::CloneFailed {
                    path: dest.clone(),
                    message: "already cloned".into(),
                });
            }
            if dest.exists() {
                std::fs::remove_dir_all(dest).map_err(|source| Error::FileWriteError {
                    path: dest.clone(),
                    source,
                })?;
            }

            let (repo, outcome) = Repository::clone_from(
                &handle.remote_url,
                dest,
                handle.branch.as_deref(),
                credentials,
                timeouts,
            )?;
            Ok((outcome, repo.baseline()?, guard))
        })
        .await?;

        self.update_state(id, |state| {
            state.record(&outcome.commit_id, &outcome.branch, baseline);
        })
        .await?;
        Ok(outcome)
    }

    /// Pull a cloned repository
    pub async fn pull(
        &self,
        id: &str,
        credentials: Credentials,
        timeouts: Timeouts,
    ) -> Result<PullOutcome> {
        let handle = self.get(id).await?;
        let guard = self.lock(id).await;

        let (outcome, branch, baseline, _guard) = run_blocking(move || {
            let repo = Repository::open(&handle.local_path)?;
            let outcome = repo.pull(credentials, timeouts)?;
            let branch = repo.head()?.branch;
            Ok((outcome, branch, repo.baseline()?, guard))
        })
        .await?;

        self.update_state(id, |state| {
            state.record(&outcome.new_commit_id, branch, baseline);
        })
        .await?;
        Ok(outcome)
    }

    /// Commit everything in a cloned repository and push it
    pub async fn commit_and_push(
        &self,
        id: &str,
        message: &str,
        author: Author,
        credentials: Credentials,
        timeouts: Timeouts,
    ) -> Result<PushOutcome> {
        let handle = self.get(id).await?;
        let guard = self.lock(id).await;
        let message = message.to_string();

        let (outcome, branch, baseline, _guard) = run_blocking(move || {
            let repo = Repository::open(&handle.local_path)?;
            let outcome = repo.commit_and_push(&message, &author, credentials, timeouts)?;
            let branch = repo.head()?.branch;
            Ok((outcome, branch, repo.baseline()?, guard))
        })
        .await?;

        self.update_state(id, |state| {
            state.record(&outcome.new_commit_id, branch, baseline);
        })
        .await?;
        Ok(outcome)
    }

    /// Pull, then commit and push; nothing to commit is not a failure here
    pub async fn sync(
        &self,
        id: &str,
        message: &str,
        author: Author,
        credentials: Credentials,
        timeouts: Timeouts,
    ) -> Result<SyncOutcome> {
        let pull = self.pull(id, credentials.clone(), timeouts).await?;

        let push = match self
            .commit_and_push(id, message, author, credentials, timeouts)
            .await
        {
            Ok(push) => Some(push),
            Err(e) if e.is_benign() => None,
            Err(e) => return Err(e),
        };

        Ok(SyncOutcome { pull, push })
    }

    /// Git-native status of a cloned repository
    pub async fn status(&self, id: &str) -> Result<StatusOutcome> {
        let handle = self.get(id).await?;
        let guard = self.lock(id).await;

        let (outcome, _guard) = run_blocking(move || {
            let outcome = Repository::open(&handle.local_path)?.status()?;
            Ok((outcome, guard))
        })
        .await?;

        let count = outcome.change_count;
        self.update_state(id, |state| state.change_count = count).await?;
        Ok(outcome)
    }

    /// Hash-based change scan against the recorded blob ids
    pub async fn refresh_changes(&self, id: &str) -> Result<ChangeSet> {
        let handle = self.get(id).await?;
        let guard = self.lock(id).await;
        let baseline = self.store.load_state(id)?.blob_hashes;

        let (changes, _guard) = run_blocking(move || {
            Ok((changes::scan(&handle.local_path, &baseline), guard))
        })
        .await?;

        let count = changes.count();
        self.update_state(id, |state| state.change_count = count).await?;
        Ok(changes)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Wait for exclusive use of one repository
    async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Read-modify-write one state record as a whole
    async fn update_state(&self, id: &str, f: impl FnOnce(&mut SyncState)) -> Result<()> {
        let _meta = self.metadata.lock().await;
        let mut state = self.store.load_state(id)?;
        f(&mut state);
        self.store.save_state(id, &state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use tempfile::TempDir;

    fn registry(tmp: &TempDir) -> Registry<MemoryStore> {
        Registry::with_store(tmp.path(), MemoryStore::new())
    }

    #[tokio::test]
    async fn test_register_derives_id() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);

        let handle = reg
            .register(None, "https://github.com/alice/notes", None)
            .await
            .unwrap();
        assert_eq!(handle.id, "notes");
        assert_eq!(handle.remote_url, "https://github.com/alice/notes.git");
        assert_eq!(handle.local_path, tmp.path().join("repos/notes"));
        assert!(reg.state("notes").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_duplicate_fails() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);

        reg.register(Some("notes"), "https://example.com/a.git", None).await.unwrap();
        let err = reg
            .register(Some("notes"), "https://example.com/b.git", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RepositoryExists { .. }));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);

        assert!(matches!(
            reg.register(Some("../x"), "https://example.com/a.git", None).await,
            Err(Error::InvalidRepositoryId { .. })
        ));
        assert!(matches!(
            reg.register(Some("ok"), "ftp://example.com/a", None).await,
            Err(Error::InvalidRemote { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_repository() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        assert!(matches!(
            reg.get("missing").await,
            Err(Error::RepositoryNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_unregister() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);

        reg.register(Some("notes"), "https://example.com/a.git", None).await.unwrap();
        std::fs::create_dir_all(reg.checkout_path("notes")).unwrap();

        reg.unregister("notes", true).await.unwrap();
        assert!(reg.list().await.unwrap().is_empty());
        assert!(!reg.checkout_path("notes").exists());
    }

    #[tokio::test]
    async fn test_operations_on_uncloned_repository() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        reg.register(Some("notes"), "https://example.com/a.git", None).await.unwrap();

        assert!(matches!(reg.status("notes").await, Err(Error::NotCloned { .. })));
        assert!(matches!(
            reg.pull("notes", Credentials::new("u", "p"), Timeouts::default()).await,
            Err(Error::NotCloned { .. })
        ));
        assert!(!reg.validate("notes").await.unwrap());
    }

    #[tokio::test]
    async fn test_validate_resets_state_when_store_missing() {
        let tmp = TempDir::new().unwrap();
        let reg = registry(&tmp);
        reg.register(Some("notes"), "https://example.com/a.git", None).await.unwrap();

        reg.update_state("notes", |state| {
            state.record("abc", "main", git::Baseline::default());
            state.change_count = 5;
        })
        .await
        .unwrap();

        assert!(!reg.validate("notes").await.unwrap());
        let state = reg.state("notes").await.unwrap();
        assert!(state.is_empty());
        assert_eq!(state.change_count, 0);
    }
}
