//! Trigger dispatch
//!
//! Executes a parsed trigger URL against the registry and builds the
//! callback URL that reports the outcome.

use chrono::Utc;
use tracing::{info, warn};
use trigger::{Action, TriggerRequest, TriggerResponse};

use crate::config::{SecretStore, Settings};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::storage::MetadataStore;

/// Commit message used when a trigger carries none
pub fn default_commit_message() -> String {
    format!("Sync {}", Utc::now().format("%Y-%m-%d %H:%M UTC"))
}

/// Runs trigger requests with the configured identity
pub struct Dispatcher<'a, S: MetadataStore> {
    registry: &'a Registry<S>,
    settings: &'a Settings,
    secrets: &'a dyn SecretStore,
}

impl<'a, S: MetadataStore> Dispatcher<'a, S> {
    pub fn new(
        registry: &'a Registry<S>,
        settings: &'a Settings,
        secrets: &'a dyn SecretStore,
    ) -> Self {
        Self {
            registry,
            settings,
            secrets,
        }
    }

    /// Parse `url`, run it and return the callback URL to activate
    pub async fn handle_url(&self, url: &str) -> Result<String> {
        let request = trigger::parse(url)?;
        let response = self.dispatch(&request).await;
        Ok(response.callback_url(&request)?)
    }

    /// Run one request; failures become error responses
    pub async fn dispatch(&self, request: &TriggerRequest) -> TriggerResponse {
        info!(action = %request.action, repo = %request.repo, "dispatching trigger");
        match self.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(action = %request.action, repo = %request.repo, error = %e, "trigger failed");
                TriggerResponse::error(e.to_string())
            }
        }
    }

    async fn execute(&self, request: &TriggerRequest) -> Result<TriggerResponse> {
        let id = request.repo.as_str();

        // The checkout may have been removed since the last run
        if !self.registry.validate(id).await? {
            let handle = self.registry.get(id).await?;
            return Err(Error::NotCloned {
                path: handle.local_path,
            });
        }

        let message = request
            .message
            .clone()
            .unwrap_or_else(default_commit_message);
        let timeouts = self.settings.timeouts();

        match request.action {
            Action::Pull => {
                let credentials = self.settings.credentials(self.secrets)?;
                let pull = self.registry.pull(id, credentials, timeouts).await?;
                let state = self.registry.state(id).await?;
                Ok(TriggerResponse::ok()
                    .with_sha(&pull.new_commit_id)
                    .with_branch(state.branch_or_default())
                    .with_message(if pull.updated { "Pulled" } else { "Already up to date" }))
            }
            Action::Push => {
                let credentials = self.settings.credentials(self.secrets)?;
                let push = self
                    .registry
                    .commit_and_push(id, &message, self.settings.author(), credentials, timeouts)
                    .await?;
                let state = self.registry.state(id).await?;
                Ok(TriggerResponse::ok()
                    .with_sha(&push.new_commit_id)
                    .with_branch(state.branch_or_default())
                    .with_message("Pushed"))
            }
            Action::Sync => {
                let credentials = self.settings.credentials(self.secrets)?;
                let sync = self
                    .registry
                    .sync(id, &message, self.settings.author(), credentials, timeouts)
                    .await?;
                let state = self.registry.state(id).await?;
                let detail = match (&sync.push, sync.pull.updated) {
                    (Some(_), _) => "Synced",
                    (None, true) => "Pulled, nothing to push",
                    (None, false) => "Already up to date",
                };
                Ok(TriggerResponse::ok()
                    .with_sha(sync.commit_id())
                    .with_branch(state.branch_or_default())
                    .with_message(detail))
            }
            Action::Status => {
                let status = self.registry.status(id).await?;
                Ok(TriggerResponse::ok()
                    .with_sha(&status.commit_id)
                    .with_branch(status.branch)
                    .with_changes(status.change_count))
            }
        }
    }
}
