//! Storage layer for worksync
//!
//! Handles the persisted repository records: registered handles and the
//! last synchronized state of each repository.

pub mod state;
pub mod store;

pub use state::{RepositoryHandle, SyncState};
pub use store::{MemoryStore, MetadataStore, YamlStore};
