//! Pull and commit-and-push
//!
//! Pull is fast-forward only: the remote tree is checked out over the working
//! directory and the branch pointer advanced, never merged. Commit-and-push
//! snapshots the whole working tree and pushes without force.

use git2::build::CheckoutBuilder;
use git2::{ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions, Signature};
use std::cell::RefCell;
use tracing::{debug, info};

use super::transport::{self, Deadline, Timeouts};
use super::{
    Author, CredentialProvider, Credentials, Head, PullOutcome, PushOutcome, Repository,
    REMOTE_NAME,
};
use crate::error::{Error, Result};

impl Repository {
    /// Fetch the tracked branch and fast-forward to it
    pub fn pull(&self, credentials: Credentials, timeouts: Timeouts) -> Result<PullOutcome> {
        let head = self.attached_head()?;
        let branch = head.branch.as_str();

        self.fetch(branch, credentials, timeouts)?;

        let tracking = format!("refs/remotes/{}/{}", REMOTE_NAME, branch);
        let remote_tip = match self.inner.refname_to_id(&tracking) {
            Ok(oid) => oid,
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!(%branch, "remote branch does not exist yet");
                return Ok(Self::unchanged(&head));
            }
            Err(e) => return Err(self.corrupted(e)),
        };

        if let Some(local_tip) = head.commit {
            if local_tip == remote_tip {
                debug!(commit = %local_tip, "already up to date");
                return Ok(Self::unchanged(&head));
            }
            if self.inner.graph_descendant_of(local_tip, remote_tip)? {
                // Unpushed local commits on top of the remote tip
                debug!(local = %local_tip, remote = %remote_tip, "local branch is ahead");
                return Ok(Self::unchanged(&head));
            }
            if !self.inner.graph_descendant_of(remote_tip, local_tip)? {
                return Err(Error::Conflict {
                    branch: branch.to_string(),
                    message: format!(
                        "local {} and remote {} have diverged, fast-forward impossible",
                        local_tip, remote_tip
                    ),
                });
            }
        }

        self.fast_forward(branch, remote_tip)?;
        info!(%branch, commit = %remote_tip, "fast-forwarded");

        Ok(PullOutcome {
            updated: true,
            new_commit_id: remote_tip.to_string(),
        })
    }

    /// Stage everything, commit on top of HEAD and push the branch
    ///
    /// A clean tree still pushes when the branch carries commits the remote
    /// has not seen, such as one left behind by an earlier failed push.
    pub fn commit_and_push(
        &self,
        message: &str,
        author: &Author,
        credentials: Credentials,
        timeouts: Timeouts,
    ) -> Result<PushOutcome> {
        let head = self.attached_head()?;
        let commit = match self.commit_all(&head, message, author) {
            Ok(commit) => commit,
            Err(Error::NothingToCommit) => match self.unpushed_tip(&head)? {
                Some(tip) => {
                    info!(branch = %head.branch, commit = %tip, "pushing earlier commit");
                    tip
                }
                None => return Err(Error::NothingToCommit),
            },
            Err(e) => return Err(e),
        };

        self.push_branch(&head.branch, credentials, timeouts)?;
        info!(branch = %head.branch, %commit, "pushed");

        Ok(PushOutcome {
            new_commit_id: commit.to_string(),
        })
    }

    /// Commit the entire working tree; `NothingToCommit` if it matches HEAD
    pub(crate) fn commit_all(&self, head: &Head, message: &str, author: &Author) -> Result<Oid> {
        let mut index = self.inner.index()?;

        // Add all changes, ignored paths included, then drop deleted files
        index.add_all(["*"].iter(), IndexAddOption::FORCE, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let tree_id = index.write_tree()?;

        let parent = match head.commit {
            Some(oid) => Some(self.inner.find_commit(oid).map_err(|e| self.corrupted(e))?),
            None => None,
        };

        let unchanged = match parent {
            Some(ref parent) => parent.tree_id() == tree_id,
            None => index.is_empty(),
        };
        if unchanged {
            debug!(tree = %tree_id, "working tree matches HEAD");
            return Err(Error::NothingToCommit);
        }

        let tree = self.inner.find_tree(tree_id)?;
        let sig = Signature::now(&author.name, &author.email)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = self
            .inner
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        debug!(commit = %oid, tree = %tree_id, "created commit");
        Ok(oid)
    }

    /// Local tip when the remote-tracking ref is behind it
    ///
    /// The tracking ref moves on fetch and on every successful push, so a
    /// local tip strictly ahead of it has not reached the remote yet.
    fn unpushed_tip(&self, head: &Head) -> Result<Option<Oid>> {
        let Some(local) = head.commit else {
            return Ok(None);
        };

        let tracking = format!("refs/remotes/{}/{}", REMOTE_NAME, head.branch);
        match self.inner.refname_to_id(&tracking) {
            Ok(remote) if remote == local => Ok(None),
            Ok(remote) => Ok(self.inner.graph_descendant_of(local, remote)?.then_some(local)),
            // The remote has never seen this branch
            Err(e) if e.code() == ErrorCode::NotFound => Ok(Some(local)),
            Err(e) => Err(self.corrupted(e)),
        }
    }

    fn fetch(&self, branch: &str, credentials: Credentials, timeouts: Timeouts) -> Result<()> {
        let mut remote = self
            .inner
            .find_remote(REMOTE_NAME)
            .map_err(|e| self.corrupted(e))?;

        let provider = CredentialProvider::new(credentials);
        let deadline = Deadline::start(timeouts);
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(transport::remote_callbacks(&provider, &deadline));

        let refspec = format!("+refs/heads/{0}:refs/remotes/{1}/{0}", branch, REMOTE_NAME);
        debug!(%refspec, "fetching");

        remote
            .fetch(&[refspec.as_str()], Some(&mut opts), None)
            .map_err(|e| transport::classify("fetch", e, &provider, &deadline))
    }

    /// Check out `target` over the working tree and point `branch` at it
    fn fast_forward(&self, branch: &str, target: Oid) -> Result<()> {
        let commit = self.inner.find_commit(target).map_err(|e| self.corrupted(e))?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        self.inner.checkout_tree(commit.as_object(), Some(&mut checkout))?;

        let refname = format!("refs/heads/{}", branch);
        let log_message = format!("pull: fast-forward to {}", target);
        self.inner.reference(&refname, target, true, &log_message)?;
        self.inner.set_head(&refname)?;
        Ok(())
    }

    fn push_branch(
        &self,
        branch: &str,
        credentials: Credentials,
        timeouts: Timeouts,
    ) -> Result<()> {
        let mut remote = self
            .inner
            .find_remote(REMOTE_NAME)
            .map_err(|e| self.corrupted(e))?;

        let provider = CredentialProvider::new(credentials);
        let deadline = Deadline::start(timeouts);
        let rejection: RefCell<Option<String>> = RefCell::new(None);

        // No leading '+': the remote refuses anything but a fast-forward
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);

        {
            let mut callbacks = transport::remote_callbacks(&provider, &deadline);
            callbacks.push_update_reference(|_refname, status| {
                if let Some(msg) = status {
                    *rejection.borrow_mut() = Some(msg.to_string());
                }
                Ok(())
            });

            let mut opts = PushOptions::new();
            opts.remote_callbacks(callbacks);

            if let Err(e) = remote.push(&[refspec.as_str()], Some(&mut opts)) {
                if transport::is_non_fast_forward(&e) {
                    return Err(Error::Conflict {
                        branch: branch.to_string(),
                        message: e.message().to_string(),
                    });
                }
                return Err(transport::classify("push", e, &provider, &deadline));
            }
        }

        if let Some(message) = rejection.into_inner() {
            if transport::is_rejection_non_fast_forward(&message) {
                return Err(Error::Conflict {
                    branch: branch.to_string(),
                    message,
                });
            }
            return Err(Error::Transport {
                operation: "push",
                message: format!("remote rejected {}: {}", branch, message),
                source: None,
            });
        }

        Ok(())
    }

    fn unchanged(head: &Head) -> PullOutcome {
        PullOutcome {
            updated: false,
            new_commit_id: head.commit_id(),
        }
    }
}
