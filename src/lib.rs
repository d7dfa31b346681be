//! worksync - local working copies kept in step with a hosted remote
//!
//! Clones a remote into a local directory, fast-forwards it, commits the
//! whole working tree and pushes it back, and reports what changed since the
//! last sync.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          worksync                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  Trigger    │  │    CLI      │  │   Settings / Secrets    │  │
//! │  │  Dispatch   │  │             │  │                         │  │
//! │  └──────┬──────┘  └──────┬──────┘  └───────────┬─────────────┘  │
//! │         │                │                     │                │
//! │         ▼                ▼                     ▼                │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                 Registry (one op per repo)                  ││
//! │  │   register / validate / clone / pull / push / sync / status ││
//! │  └──────────────┬──────────────────────────────┬───────────────┘│
//! │                 │                              │                │
//! │                 ▼                              ▼                │
//! │  ┌──────────────────────────────┐  ┌──────────────────────────┐ │
//! │  │   Engine (blocking pool)     │  │   Metadata Store         │ │
//! │  └──────────────┬───────────────┘  │   (SyncState, YAML)      │ │
//! │                 │                  └──────────────────────────┘ │
//! │                 ▼                                               │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │                       Git Gateway                           ││
//! │  │  clone, fetch + fast-forward, commit + push, credentials    ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use worksync::{config::MemorySecretStore, Registry, Settings};
//!
//! # async fn run() -> worksync::Result<()> {
//! let registry = Registry::open(".worksync");
//! let settings = Settings::default();
//! let secrets = MemorySecretStore::new().with("worksync.token", "ghp_example");
//!
//! registry.register(None, "https://github.com/alice/notes", None).await?;
//! let credentials = settings.credentials(&secrets)?;
//! registry.clone("notes", credentials, settings.timeouts()).await?;
//! # Ok(())
//! # }
//! ```

pub mod changes;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod git;
pub mod registry;
pub mod storage;
pub mod validation;

pub use config::{EnvSecretStore, SecretStore, Settings};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use git::hash::blob_hash;
pub use git::{
    Author, CloneOutcome, CredentialProvider, Credentials, PullOutcome, PushOutcome, Repository,
    StatusOutcome, Timeouts,
};
pub use registry::{Registry, SyncOutcome};
pub use storage::{RepositoryHandle, SyncState};
