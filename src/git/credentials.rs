//! Transport credentials
//!
//! A [`CredentialProvider`] lives for exactly one clone, fetch or push. It
//! answers the first credential request with the configured username and
//! secret and refuses every later one, so a rejected token fails the operation
//! instead of looping.

use git2::{Cred, CredentialType};
use std::cell::Cell;
use std::fmt;

/// Message attached to the error returned on a refused credential request
pub const CREDENTIALS_REFUSED: &str = "credentials already supplied once for this operation";

/// Username and secret for the remote (typically a personal access token)
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Operation-scoped credential callback state
pub struct CredentialProvider {
    credentials: Credentials,
    requests: Cell<u32>,
    refused: Cell<bool>,
}

impl CredentialProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            requests: Cell::new(0),
            refused: Cell::new(false),
        }
    }

    /// Answer a credential request from the transport
    pub fn provide(&self, allowed: CredentialType) -> Result<Cred, git2::Error> {
        let attempt = self.requests.get() + 1;
        self.requests.set(attempt);

        if attempt > 1 {
            self.refused.set(true);
            tracing::warn!(attempt, "remote asked for credentials again, refusing");
            return Err(git2::Error::from_str(CREDENTIALS_REFUSED));
        }

        if !allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            self.refused.set(true);
            return Err(git2::Error::from_str(
                "remote does not accept username/password authentication",
            ));
        }

        Cred::userpass_plaintext(&self.credentials.username, &self.credentials.secret)
    }

    /// Number of credential requests seen so far
    pub fn requests(&self) -> u32 {
        self.requests.get()
    }

    /// True once a request was refused, i.e. the remote rejected our credentials
    pub fn was_refused(&self) -> bool {
        self.refused.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_is_answered() {
        let provider = CredentialProvider::new(Credentials::new("x-access-token", "t0ken"));
        assert!(provider.provide(CredentialType::USER_PASS_PLAINTEXT).is_ok());
        assert_eq!(provider.requests(), 1);
        assert!(!provider.was_refused());
    }

    #[test]
    fn test_second_request_is_refused() {
        let provider = CredentialProvider::new(Credentials::new("x-access-token", "bad"));
        assert!(provider.provide(CredentialType::USER_PASS_PLAINTEXT).is_ok());

        let second = provider.provide(CredentialType::USER_PASS_PLAINTEXT);
        assert!(second.is_err());
        assert!(provider.was_refused());

        // Still refused, never answered again
        assert!(provider.provide(CredentialType::USER_PASS_PLAINTEXT).is_err());
        assert_eq!(provider.requests(), 3);
    }

    #[test]
    fn test_unsupported_auth_type_is_refused() {
        let provider = CredentialProvider::new(Credentials::new("git", "secret"));
        assert!(provider.provide(CredentialType::SSH_KEY).is_err());
        assert!(provider.was_refused());
    }

    #[test]
    fn test_debug_hides_secret() {
        let creds = Credentials::new("alice", "ghp_supersecret");
        let shown = format!("{:?}", creds);
        assert!(shown.contains("alice"));
        assert!(!shown.contains("ghp_supersecret"));
    }
}
