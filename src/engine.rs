//! Async entry points
//!
//! Git work is blocking (network, disk walk, hashing), so every operation
//! runs on tokio's blocking pool and the caller awaits its result. Callers
//! that share a working directory must serialize their calls; the
//! [`Registry`](crate::registry::Registry) does that per repository.

use std::path::PathBuf;

use crate::error::Result;
use crate::git::{
    self, Author, CloneOutcome, Credentials, PullOutcome, PushOutcome, Repository, StatusOutcome,
    Timeouts,
};

/// Run a blocking repository operation off the async threads
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Clone `remote_url` into `dest`
pub async fn clone(
    remote_url: impl Into<String>,
    dest: impl Into<PathBuf>,
    branch: Option<String>,
    credentials: Credentials,
    timeouts: Timeouts,
) -> Result<CloneOutcome> {
    let remote_url = remote_url.into();
    let dest = dest.into();
    run_blocking(move || {
        Repository::clone_from(&remote_url, &dest, branch.as_deref(), credentials, timeouts)
            .map(|(_, outcome)| outcome)
    })
    .await
}

/// Fetch and fast-forward the working copy at `path`
pub async fn pull(
    path: impl Into<PathBuf>,
    credentials: Credentials,
    timeouts: Timeouts,
) -> Result<PullOutcome> {
    let path = path.into();
    run_blocking(move || Repository::open(&path)?.pull(credentials, timeouts)).await
}

/// Commit the whole working tree at `path` and push it
pub async fn commit_and_push(
    path: impl Into<PathBuf>,
    message: impl Into<String>,
    author: Author,
    credentials: Credentials,
    timeouts: Timeouts,
) -> Result<PushOutcome> {
    let path = path.into();
    let message = message.into();
    run_blocking(move || {
        Repository::open(&path)?.commit_and_push(&message, &author, credentials, timeouts)
    })
    .await
}

/// Branch, tip and change count of the working copy at `path`
pub async fn status(path: impl Into<PathBuf>) -> Result<StatusOutcome> {
    let path = path.into();
    run_blocking(move || Repository::open(&path)?.status()).await
}

/// Whether `path` holds a usable working copy
pub async fn has_valid_store(path: impl Into<PathBuf>) -> bool {
    let path = path.into();
    tokio::task::spawn_blocking(move || git::has_valid_store(&path))
        .await
        .unwrap_or(false)
}
