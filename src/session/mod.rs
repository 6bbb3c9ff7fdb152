// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Session
//!
//! A scoped network ingress permission to the remote WebDriver endpoint.
//!
//! `open` enables a single well-known firewall rule that admits this host's
//! public address, then resolves the endpoint of the tagged automation
//! instance. `close` disables the rule again. Between the two calls the
//! endpoint is reachable; outside them it is not.
//!
//! ## Scoping
//!
//! Callers never pair `open`/`close` by hand. [`SessionGuard::acquire`] opens
//! the session and the guard closes it exactly once: through
//! [`SessionGuard::release`] on the normal path, or from `Drop` when the
//! owning task unwinds or returns early. A failed `open` is closed before the
//! error is returned because the rule may already have been enabled.
//!
//! ## Concurrency
//!
//! The rule is process-global and last-writer-wins. Two overlapping sessions
//! overwrite each other's source range, and the first `close` disables access
//! for both. Batches are expected to run one at a time.

pub mod compute;
pub mod mock;

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

pub use compute::{ComputeApiError, ComputeConfig, ComputeSession};
pub use mock::MockSession;

/// Port the WebDriver hub listens on.
pub const WEBDRIVER_PORT: u16 = 4444;

/// Resolved address of the automation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    endpoint: String,
}

impl SessionHandle {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// `host:port` of the endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Base URL of the WebDriver hub behind the endpoint.
    pub fn hub_url(&self) -> String {
        format!("http://{}/wd/hub", self.endpoint)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No running instance carries the tag, or none has an external address.
    #[error("no running instance tagged {tag:?} with an external address")]
    NoEndpoint { tag: String },

    #[error("session acquisition failed: {0}")]
    Acquisition(#[source] ComputeApiError),

    #[error("session release failed: {0}")]
    Release(#[source] ComputeApiError),
}

/// A revocable grant of network access to the automation endpoint.
pub trait AccessSession: Send + Sync + 'static {
    /// Enable access and resolve the endpoint of the instance tagged `target_tag`.
    fn open(
        &self,
        target_tag: &str,
    ) -> impl Future<Output = Result<SessionHandle, SessionError>> + Send;

    /// Revoke access. Runs whether or not the work done with the handle succeeded.
    fn close(&self) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Whether this session reaches real managed infrastructure.
    fn is_remote(&self) -> bool;
}

// =============================================================================
// Scoped Guard
// =============================================================================

/// An open session that is closed exactly once.
pub struct SessionGuard<S: AccessSession> {
    session: Arc<S>,
    handle: SessionHandle,
    armed: bool,
}

impl<S: AccessSession> SessionGuard<S> {
    /// Open a session. On failure the session is closed before returning.
    pub async fn acquire(session: Arc<S>, target_tag: &str) -> Result<Self, SessionError> {
        match session.open(target_tag).await {
            Ok(handle) => {
                info!(endpoint = %handle.endpoint(), target_tag, "Access session opened");
                Ok(Self {
                    session,
                    handle,
                    armed: true,
                })
            }
            Err(err) => {
                if let Err(close_err) = session.close().await {
                    warn!(error = %close_err, "Failed to revoke access after failed open");
                }
                Err(err)
            }
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Close the session and report the outcome.
    pub async fn release(mut self) -> Result<(), SessionError> {
        self.armed = false;
        let result = self.session.close().await;
        if result.is_ok() {
            info!(endpoint = %self.handle.endpoint(), "Access session closed");
        }
        result
    }
}

impl<S: AccessSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = session.close().await {
                        warn!(error = %err, "Failed to revoke access for dropped session");
                    }
                });
            }
            Err(_) => {
                warn!(
                    endpoint = %self.handle.endpoint(),
                    "Session dropped outside a runtime; access was not revoked"
                );
            }
        }
    }
}

// =============================================================================
// Provider
// =============================================================================

/// The session variant chosen at start-up.
#[derive(Clone)]
pub enum SessionProvider {
    Compute(ComputeSession),
    Mock(MockSession),
}

impl AccessSession for SessionProvider {
    async fn open(&self, target_tag: &str) -> Result<SessionHandle, SessionError> {
        match self {
            SessionProvider::Compute(session) => session.open(target_tag).await,
            SessionProvider::Mock(session) => session.open(target_tag).await,
        }
    }

    async fn close(&self) -> Result<(), SessionError> {
        match self {
            SessionProvider::Compute(session) => session.close().await,
            SessionProvider::Mock(session) => session.close().await,
        }
    }

    fn is_remote(&self) -> bool {
        match self {
            SessionProvider::Compute(session) => session.is_remote(),
            SessionProvider::Mock(session) => session.is_remote(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSession {
        fail_open: bool,
        opens: AtomicUsize,
        closes: AtomicUsize,
    }

    impl AccessSession for CountingSession {
        async fn open(&self, target_tag: &str) -> Result<SessionHandle, SessionError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(SessionError::NoEndpoint {
                    tag: target_tag.to_string(),
                });
            }
            Ok(SessionHandle::new("10.0.0.1:4444"))
        }

        async fn close(&self) -> Result<(), SessionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_remote(&self) -> bool {
            false
        }
    }

    #[test]
    fn hub_url_wraps_endpoint() {
        let handle = SessionHandle::new("203.0.113.9:4444");
        assert_eq!(handle.hub_url(), "http://203.0.113.9:4444/wd/hub");
    }

    #[tokio::test]
    async fn release_closes_once() {
        let session = Arc::new(CountingSession::default());
        let guard = SessionGuard::acquire(session.clone(), "selenium").await.unwrap();
        assert_eq!(guard.handle().endpoint(), "10.0.0.1:4444");

        guard.release().await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(session.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_open_still_closes_once() {
        let session = Arc::new(CountingSession {
            fail_open: true,
            ..Default::default()
        });
        let result = SessionGuard::acquire(session.clone(), "selenium").await;
        assert!(matches!(result, Err(SessionError::NoEndpoint { .. })));
        assert_eq!(session.opens.load(Ordering::SeqCst), 1);
        assert_eq!(session.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_guard_closes_in_background() {
        let session = Arc::new(CountingSession::default());
        {
            let _guard = SessionGuard::acquire(session.clone(), "selenium").await.unwrap();
        }
        for _ in 0..10 {
            if session.closes.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(session.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_delegates_to_mock() {
        let provider = SessionProvider::Mock(MockSession::new("localhost:4444"));
        assert!(!provider.is_remote());
        let handle = provider.open("selenium").await.unwrap();
        assert_eq!(handle.endpoint(), "localhost:4444");
        provider.close().await.unwrap();
    }
}
