//! Settings and secrets
//!
//! Settings live in `<root>/config.yaml`:
//!
//! ```yaml
//! author_name: Alice
//! author_email: alice@example.com
//! username: x-access-token
//! token_key: worksync.token
//! connect_timeout_secs: 15
//! transfer_timeout_secs: 300
//! ```
//!
//! The access token itself is never stored here; it is looked up through a
//! [`SecretStore`] under `token_key` on every operation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::git::{Author, Credentials, Timeouts};

/// File name of the settings document inside the data root
pub const SETTINGS_FILE: &str = "config.yaml";

/// User settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub author_name: String,
    pub author_email: String,
    /// Transport username paired with the token
    pub username: String,
    /// Secret store key of the access token
    pub token_key: String,
    pub connect_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            author_name: "worksync".into(),
            author_email: "worksync@localhost".into(),
            username: "x-access-token".into(),
            token_key: "worksync.token".into(),
            connect_timeout_secs: 15,
            transfer_timeout_secs: 300,
        }
    }
}

impl Settings {
    /// Load settings from `<root>/config.yaml`, defaults when missing
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(SETTINGS_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(serde_yaml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(Error::FileReadError { path, source }),
        }
    }

    pub fn author(&self) -> Author {
        Author::new(&self.author_name, &self.author_email)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            transfer: Duration::from_secs(self.transfer_timeout_secs),
        }
    }

    /// Build transport credentials, fetching the token from `secrets`
    pub fn credentials(&self, secrets: &dyn SecretStore) -> Result<Credentials> {
        let secret = secrets.load(&self.token_key).ok_or_else(|| Error::MissingSecret {
            key: self.token_key.clone(),
        })?;
        Ok(Credentials::new(&self.username, secret))
    }
}

/// Keyed secret lookup
pub trait SecretStore: Send + Sync {
    fn load(&self, key: &str) -> Option<String>;
}

/// Secrets from environment variables
///
/// `worksync.token` is read from `WORKSYNC_TOKEN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn variable_name(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl SecretStore for EnvSecretStore {
    fn load(&self, key: &str) -> Option<String> {
        std::env::var(Self::variable_name(key))
            .ok()
            .filter(|v| !v.is_empty())
    }
}

/// Fixed secrets held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    secrets: HashMap<String, String>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), secret.into());
        self
    }
}

impl SecretStore for MemorySecretStore {
    fn load(&self, key: &str) -> Option<String> {
        self.secrets.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(Settings::load(tmp.path()).unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(SETTINGS_FILE),
            "author_name: Alice\ntransfer_timeout_secs: 60\n",
        )
        .unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.author_name, "Alice");
        assert_eq!(settings.author_email, "worksync@localhost");
        assert_eq!(settings.timeouts().transfer, Duration::from_secs(60));
        assert_eq!(settings.timeouts().connect, Duration::from_secs(15));
    }

    #[test]
    fn test_credentials_from_secret_store() {
        let settings = Settings::default();
        let secrets = MemorySecretStore::new().with("worksync.token", "ghp_123");

        let creds = settings.credentials(&secrets).unwrap();
        assert_eq!(creds.username, "x-access-token");
        assert_eq!(creds.secret, "ghp_123");
    }

    #[test]
    fn test_missing_secret() {
        let err = Settings::default()
            .credentials(&MemorySecretStore::new())
            .unwrap_err();
        assert!(matches!(err, Error::MissingSecret { .. }));
        assert!(err.requires_user_action());
    }

    #[test]
    fn test_env_variable_name() {
        assert_eq!(EnvSecretStore::variable_name("worksync.token"), "WORKSYNC_TOKEN");
        assert_eq!(EnvSecretStore::variable_name("notes-pat"), "NOTES_PAT");
    }
}
