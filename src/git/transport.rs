//! Remote transport plumbing: callbacks, timeouts, error classification
//!
//! [`Timeouts`] are enforced twice. libgit2's socket timeouts bound a stalled
//! connect and a stalled read or write, and a per-operation [`Deadline`]
//! aborts from the progress and push-negotiation callbacks once the whole
//! transfer overruns.

use git2::{ErrorClass, ErrorCode, RemoteCallbacks};
use std::cell::Cell;
use std::sync::Once;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::credentials::CredentialProvider;
use crate::error::Error;

/// libgit2's `GIT_ETIMEOUT`
const GIT_ETIMEOUT: i32 = -37;

static SOCKET_TIMEOUTS: Once = Once::new();

/// Time limits for a network leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Time allowed to open the connection and see the first progress
    pub connect: Duration,
    /// Time allowed for the whole transfer, and for any single stalled read or write
    pub transfer: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            transfer: Duration::from_secs(300),
        }
    }
}

/// Install libgit2's socket timeouts
///
/// libgit2 keeps one setting per process, so only the first call counts.
pub fn install_socket_timeouts(timeouts: Timeouts) {
    SOCKET_TIMEOUTS.call_once(|| {
        let connect = millis(timeouts.connect);
        let io = millis(timeouts.transfer);
        // SAFETY: every transfer builds its callbacks through `remote_callbacks`,
        // which blocks on this `Once`, so no transport reads the options meanwhile.
        let installed = unsafe {
            git2::opts::set_server_connect_timeout_in_milliseconds(connect)
                .and_then(|()| git2::opts::set_server_timeout_in_milliseconds(io))
        };
        match installed {
            Ok(()) => debug!(connect_ms = connect, io_ms = io, "installed socket timeouts"),
            Err(e) => warn!(error = %e, "could not install socket timeouts"),
        }
    });
}

fn millis(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

/// Per-operation deadline, checked from the transport callbacks
pub(crate) struct Deadline {
    started: Instant,
    timeouts: Timeouts,
    progressed: Cell<bool>,
    expired: Cell<bool>,
}

impl Deadline {
    pub(crate) fn start(timeouts: Timeouts) -> Self {
        Self {
            started: Instant::now(),
            timeouts,
            progressed: Cell::new(false),
            expired: Cell::new(false),
        }
    }

    /// Returns false when the transfer should be aborted
    fn tick(&self) -> bool {
        let elapsed = self.started.elapsed();
        let first = !self.progressed.replace(true);

        if elapsed > self.timeouts.transfer || (first && elapsed > self.timeouts.connect) {
            self.expired.set(true);
            return false;
        }
        true
    }

    /// `tick` for callbacks that abort by returning an error
    fn check(&self) -> Result<(), git2::Error> {
        if self.tick() {
            Ok(())
        } else {
            Err(git2::Error::from_str("transfer deadline exceeded"))
        }
    }

    /// True once a callback aborted the transfer
    fn expired(&self) -> bool {
        self.expired.get()
    }

    /// True once a limit was hit, whether or not a callback noticed in time
    fn overdue(&self) -> bool {
        self.expired() || self.started.elapsed() > self.timeouts.transfer
    }
}

/// Callbacks shared by clone, fetch and push
pub(crate) fn remote_callbacks<'a>(
    provider: &'a CredentialProvider,
    deadline: &'a Deadline,
) -> RemoteCallbacks<'a> {
    install_socket_timeouts(deadline.timeouts);

    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username_from_url, allowed| provider.provide(allowed));
    callbacks.transfer_progress(move |_stats| deadline.tick());
    callbacks.sideband_progress(move |_data| deadline.tick());
    // Uploads report progress but cannot abort from it; negotiation can
    callbacks.push_negotiation(move |_updates| deadline.check());
    callbacks.push_transfer_progress(move |_current, _total, _bytes| {
        deadline.tick();
    });
    callbacks
}

/// Map a transport error to the error taxonomy
pub(crate) fn classify(
    operation: &'static str,
    err: git2::Error,
    provider: &CredentialProvider,
    deadline: &Deadline,
) -> Error {
    if deadline.overdue() || is_timeout(&err) {
        return Error::TransportTimeout { operation };
    }
    if provider.was_refused() || is_auth_error(&err) {
        debug!(operation, requests = provider.requests(), "remote rejected credentials");
        return Error::Authentication;
    }
    Error::Transport {
        operation,
        message: err.message().to_string(),
        source: Some(err),
    }
}

fn is_timeout(err: &git2::Error) -> bool {
    err.raw_code() == GIT_ETIMEOUT || err.message().to_ascii_lowercase().contains("timed out")
}

fn is_auth_error(err: &git2::Error) -> bool {
    if err.code() == ErrorCode::Auth {
        return true;
    }
    let message = err.message();
    err.class() == ErrorClass::Http
        && (message.contains("401")
            || message.contains("403")
            || message.contains("authentication"))
}

/// True when a push failed because the remote branch moved on
pub(crate) fn is_non_fast_forward(err: &git2::Error) -> bool {
    err.code() == ErrorCode::NotFastForward || is_rejection_non_fast_forward(err.message())
}

/// Classify a per-ref rejection reported by the remote
pub(crate) fn is_rejection_non_fast_forward(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("non-fast-forward")
        || message.contains("non-fastforward")
        || message.contains("fetch first")
        || message.contains("failed to update ref")
}
