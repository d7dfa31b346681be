//! Error types for worksync
//!
//! Every repository operation reports a typed outcome. Callers branch on the
//! variant: `NothingToCommit` is a benign skip, `Authentication` needs the user,
//! transport failures can be retried.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for worksync operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Store Errors
    // ==========================================================================
    #[error("No repository has been cloned at '{path}'")]
    NotCloned { path: PathBuf },

    #[error("Repository at '{path}' is unreadable: {message}")]
    StoreCorrupted { path: PathBuf, message: String },

    #[error("Clone into '{path}' failed: {message}")]
    CloneFailed { path: PathBuf, message: String },

    #[error("HEAD of '{path}' is detached from any branch")]
    DetachedHead { path: PathBuf },

    // ==========================================================================
    // Remote Errors
    // ==========================================================================
    #[error("Invalid remote '{url}': {reason}")]
    InvalidRemote { url: String, reason: &'static str },

    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
        #[source]
        source: Option<git2::Error>,
    },

    #[error("{operation} timed out")]
    TransportTimeout { operation: &'static str },

    #[error("Authentication rejected by remote")]
    Authentication,

    #[error("No secret stored under '{key}'")]
    MissingSecret { key: String },

    #[error("Remote branch '{branch}' has diverged: {message}")]
    Conflict { branch: String, message: String },

    // ==========================================================================
    // Commit Errors
    // ==========================================================================
    #[error("Nothing to commit")]
    NothingToCommit,

    // ==========================================================================
    // Registry Errors
    // ==========================================================================
    #[error("Repository '{id}' is not registered")]
    RepositoryNotFound { id: String },

    #[error("Repository '{id}' is already registered")]
    RepositoryExists { id: String },

    #[error("Invalid repository id '{value}': {reason}")]
    InvalidRepositoryId { value: String, reason: &'static str },

    #[error("{0}")]
    Trigger(#[from] trigger::ParseError),

    // ==========================================================================
    // IO Errors
    // ==========================================================================
    #[error("Failed to read '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse metadata: {message}")]
    Metadata { message: String },

    // ==========================================================================
    // Catch-all
    // ==========================================================================
    #[error("Git operation failed: {message}")]
    Git {
        message: String,
        #[source]
        source: Option<git2::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for worksync operations
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Error::Git {
            message: err.message().to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Metadata {
            message: err.to_string(),
        }
    }
}

impl From<crate::validation::ValidationError> for Error {
    fn from(err: crate::validation::ValidationError) -> Self {
        use crate::validation::ValidationError;
        match err {
            ValidationError::InvalidIdentifier(value, reason) => {
                Error::InvalidRepositoryId { value, reason }
            }
            ValidationError::TooLong(value, _max) => Error::InvalidRepositoryId {
                value,
                reason: "exceeds maximum length",
            },
            ValidationError::Empty => Error::InvalidRepositoryId {
                value: String::new(),
                reason: "cannot be empty",
            },
            ValidationError::InvalidRemote(url, reason) => Error::InvalidRemote { url, reason },
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Other(format!("repository task aborted: {}", err))
    }
}

// =============================================================================
// Error Classification
// =============================================================================

impl Error {
    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::NotCloned { .. } => Some("Clone the repository first"),
            Error::StoreCorrupted { .. } => Some("Remove the local copy and clone it again"),
            Error::DetachedHead { .. } => Some("Check out the tracked branch again"),
            Error::InvalidRemote { .. } => Some("Use an https:// remote address"),
            Error::Authentication | Error::MissingSecret { .. } => {
                Some("Sign in again or replace the access token")
            }
            Error::Conflict { .. } => Some("Pull the remote changes before pushing"),
            Error::Transport { .. } | Error::TransportTimeout { .. } => {
                Some("Check the network connection and retry")
            }
            _ => None,
        }
    }

    /// Returns true if retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::TransportTimeout { .. }
        )
    }

    /// Returns true if a person has to act before retrying makes sense
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::Authentication
                | Error::MissingSecret { .. }
                | Error::Conflict { .. }
                | Error::StoreCorrupted { .. }
                | Error::DetachedHead { .. }
                | Error::InvalidRemote { .. }
        )
    }

    /// Returns true for outcomes automated callers should treat as a skip
    pub fn is_benign(&self) -> bool {
        matches!(self, Error::NothingToCommit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotCloned {
            path: PathBuf::from("/tmp/notes"),
        };
        assert_eq!(err.to_string(), "No repository has been cloned at '/tmp/notes'");
    }

    #[test]
    fn test_nothing_to_commit_is_only_benign_kind() {
        assert!(Error::NothingToCommit.is_benign());
        assert!(!Error::NothingToCommit.is_retryable());
        assert!(!Error::Authentication.is_benign());
        assert!(!Error::Conflict {
            branch: "main".into(),
            message: "non-fast-forward".into()
        }
        .is_benign());
    }

    #[test]
    fn test_authentication_needs_user() {
        assert!(Error::Authentication.requires_user_action());
        assert!(!Error::Authentication.is_retryable());
        assert!(Error::Authentication.suggestion().is_some());
    }

    #[test]
    fn test_transport_is_retryable() {
        let err = Error::Transport {
            operation: "fetch",
            message: "connection reset".into(),
            source: None,
        };
        assert!(err.is_retryable());
        assert!(!err.requires_user_action());
    }
}
