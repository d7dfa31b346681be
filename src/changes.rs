//! Hash-based change detection
//!
//! Compares the blob id of every non-hidden file in a working directory with
//! the table recorded at the last sync. This works without an object
//! database, so it also serves working copies mirrored file by file.
//!
//! Directory layout example:
//! ```text
//! /notes/
//!   a.md          unchanged  -> not counted
//!   b.md          edited     -> modified
//!   c.md          new        -> added
//!   (d.md)        gone       -> deleted
//!   .obsidian/    hidden     -> ignored
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::git::hash::blob_hash;

/// Paths grouped by change kind, each list sorted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    /// Total number of changed paths
    pub fn count(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// True for names the scan never looks at (dotfiles, `.git`)
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

fn is_hidden(entry: &DirEntry) -> bool {
    // The root itself may live under a dot directory (e.g. a temp dir)
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(is_hidden_name)
            .unwrap_or(false)
}

/// Every non-hidden regular file under `root`, as (repo-relative path, absolute path)
///
/// Relative paths use `/` separators, like tree entries.
pub fn visible_files(root: &Path) -> impl Iterator<Item = (String, PathBuf)> + '_ {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(move |e| {
            let rel = e.path().strip_prefix(root).ok()?;
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Some((rel, e.into_path()))
        })
}

/// Compare the working directory with the recorded blob ids
///
/// Unreadable files are treated as absent from the scan.
pub fn scan(root: &Path, baseline: &BTreeMap<String, String>) -> ChangeSet {
    scan_with(root, baseline, |path| std::fs::read(path))
}

fn scan_with<R>(root: &Path, baseline: &BTreeMap<String, String>, read: R) -> ChangeSet
where
    R: Fn(&Path) -> io::Result<Vec<u8>>,
{
    let mut changes = ChangeSet::default();
    let mut seen = BTreeSet::new();

    for (rel, abs) in visible_files(root) {
        let content = match read(&abs) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %rel, error = %e, "skipping unreadable file");
                continue;
            }
        };

        match baseline.get(&rel) {
            None => changes.added.push(rel.clone()),
            Some(recorded) if *recorded != blob_hash(&content) => {
                changes.modified.push(rel.clone())
            }
            Some(_) => {}
        }
        seen.insert(rel);
    }

    changes.deleted = baseline
        .keys()
        .filter(|path| !seen.contains(*path))
        .cloned()
        .collect();

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn baseline_of(files: &[(&str, &str)]) -> BTreeMap<String, String> {
        files
            .iter()
            .map(|(p, c)| (p.to_string(), blob_hash(c.as_bytes())))
            .collect()
    }

    #[test]
    fn test_added_modified_deleted() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let baseline = baseline_of(&[("a.md", "alpha"), ("b.md", "beta"), ("d.md", "delta")]);

        fs::write(root.join("a.md"), "alpha").unwrap();
        fs::write(root.join("b.md"), "beta, edited").unwrap();
        fs::write(root.join("c.md"), "gamma").unwrap();

        let changes = scan(root, &baseline);
        assert_eq!(changes.added, vec!["c.md"]);
        assert_eq!(changes.modified, vec!["b.md"]);
        assert_eq!(changes.deleted, vec!["d.md"]);
        assert_eq!(changes.count(), 3);
    }

    #[test]
    fn test_hidden_entries_ignored() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(root.join(".DS_Store"), "junk").unwrap();
        fs::create_dir_all(root.join("notes")).unwrap();
        fs::write(root.join("notes/today.md"), "hi").unwrap();

        let files: Vec<String> = visible_files(root).map(|(rel, _)| rel).collect();
        assert_eq!(files, vec!["notes/today.md"]);
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("locked.md"), "secret").unwrap();
        fs::write(root.join("open.md"), "hello").unwrap();

        let baseline = baseline_of(&[("locked.md", "secret")]);
        let changes = scan_with(root, &baseline, |path| {
            if path.ends_with("locked.md") {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            } else {
                fs::read(path)
            }
        });

        assert_eq!(changes.deleted, vec!["locked.md"]);
        assert_eq!(changes.added, vec!["open.md"]);
        assert!(changes.modified.is_empty());
    }
}
