//! Metadata persistence
//!
//! Directory structure of the YAML store:
//! ```text
//! /<root>/
//!   repositories.yaml     registered handles
//!   state/
//!     notes.yaml          SyncState of repository "notes"
//!     journal.yaml
//! ```
//!
//! Every write goes to a temporary sibling first, is flushed to disk and is
//! renamed into place, so an interrupted write leaves the previous file intact.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::state::{RepositoryHandle, SyncState};
use crate::error::{Error, Result};

/// Persistence boundary for repository metadata
pub trait MetadataStore: Send + Sync {
    /// All registered handles, in registration order
    fn load_handles(&self) -> Result<Vec<RepositoryHandle>>;

    /// Replace the registered handles
    fn save_handles(&self, handles: &[RepositoryHandle]) -> Result<()>;

    /// State of one repository; empty when nothing was recorded
    fn load_state(&self, id: &str) -> Result<SyncState>;

    /// Replace the state of one repository
    fn save_state(&self, id: &str, state: &SyncState) -> Result<()>;

    /// Forget the state of one repository
    fn remove_state(&self, id: &str) -> Result<()>;
}

/// YAML files under a root directory
#[derive(Debug, Clone)]
pub struct YamlStore {
    root: PathBuf,
}

impl YamlStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn handles_path(&self) -> PathBuf {
        self.root.join("repositories.yaml")
    }

    fn state_path(&self, id: &str) -> PathBuf {
        self.root.join("state").join(format!("{}.yaml", id))
    }
}

impl MetadataStore for YamlStore {
    fn load_handles(&self) -> Result<Vec<RepositoryHandle>> {
        Ok(read_yaml(&self.handles_path())?.unwrap_or_default())
    }

    fn save_handles(&self, handles: &[RepositoryHandle]) -> Result<()> {
        write_yaml(&self.handles_path(), &handles)
    }

    fn load_state(&self, id: &str) -> Result<SyncState> {
        Ok(read_yaml(&self.state_path(id))?.unwrap_or_default())
    }

    fn save_state(&self, id: &str, state: &SyncState) -> Result<()> {
        write_yaml(&self.state_path(id), state)
    }

    fn remove_state(&self, id: &str) -> Result<()> {
        let path = self.state_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::FileWriteError { path, source }),
        }
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_yaml::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::FileReadError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_yaml<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_yaml::to_string(value)?;
    let write_err = |source| Error::FileWriteError {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let tmp = path.with_extension("yaml.tmp");
    let mut file = File::create(&tmp).map_err(write_err)?;
    file.write_all(content.as_bytes()).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(write_err)?;

    // Make the rename itself durable
    #[cfg(unix)]
    {
        if let Some(dir) = path.parent().and_then(|parent| File::open(parent).ok()) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// In-memory store for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStore {
    handles: Mutex<Vec<RepositoryHandle>>,
    states: Mutex<HashMap<String, SyncState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::Other("metadata store lock poisoned".into())
}

impl MetadataStore for MemoryStore {
    fn load_handles(&self) -> Result<Vec<RepositoryHandle>> {
        Ok(self.handles.lock().map_err(poisoned)?.clone())
    }

    fn save_handles(&self, handles: &[RepositoryHandle]) -> Result<()> {
        *self.handles.lock().map_err(poisoned)? = handles.to_vec();
        Ok(())
    }

    fn load_state(&self, id: &str) -> Result<SyncState> {
        Ok(self
            .states
            .lock()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_state(&self, id: &str, state: &SyncState) -> Result<()> {
        self.states
            .lock()
            .map_err(poisoned)?
            .insert(id.to_string(), state.clone());
        Ok(())
    }

    fn remove_state(&self, id: &str) -> Result<()> {
        self.states.lock().map_err(poisoned)?.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Baseline;
    use tempfile::TempDir;

    fn handle(id: &str) -> RepositoryHandle {
        RepositoryHandle {
            id: id.to_string(),
            local_path: PathBuf::from("/data/repos").join(id),
            remote_url: format!("https://example.com/{}.git", id),
            branch: None,
        }
    }

    #[test]
    fn test_yaml_store_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = YamlStore::new(tmp.path());

        assert!(store.load_handles().unwrap().is_empty());
        assert!(store.load_state("notes").unwrap().is_empty());

        store.save_handles(&[handle("notes"), handle("journal")]).unwrap();
        let mut state = SyncState::default();
        state.record("abc123", "main", Baseline::default());
        state.blob_hashes.insert("a.md".into(), "e69de29b".into());
        store.save_state("notes", &state).unwrap();

        let handles = store.load_handles().unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[1].id, "journal");
        assert_eq!(store.load_state("notes").unwrap(), state);

        // No temporary files left behind
        assert!(!tmp.path().join("state/notes.yaml.tmp").exists());
    }

    #[test]
    fn test_yaml_store_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let store = YamlStore::new(tmp.path());
        store.save_state("notes", &SyncState::default()).unwrap();
        store.save_state("notes", &SyncState::default()).unwrap();

        let names: Vec<_> = std::fs::read_dir(tmp.path().join("state"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["notes.yaml"]);
    }

    #[test]
    fn test_yaml_store_remove_state() {
        let tmp = TempDir::new().unwrap();
        let store = YamlStore::new(tmp.path());
        store.save_state("notes", &SyncState::default()).unwrap();
        store.remove_state("notes").unwrap();
        store.remove_state("notes").unwrap();
        assert!(!tmp.path().join("state/notes.yaml").exists());
    }

    #[test]
    fn test_yaml_store_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("state")).unwrap();
        std::fs::write(tmp.path().join("state/notes.yaml"), "blob_hashes: [not, a, map").unwrap();
        let store = YamlStore::new(tmp.path());
        assert!(matches!(store.load_state("notes"), Err(Error::Metadata { .. })));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.save_handles(&[handle("a")]).unwrap();
        assert_eq!(store.load_handles().unwrap()[0].id, "a");
        assert!(store.load_state("a").unwrap().is_empty());
    }
}
