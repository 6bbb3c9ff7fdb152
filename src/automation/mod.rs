// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Automation Driver
//!
//! Remote browser automation for one fixed reload flow.
//!
//! - [`webdriver`]: the wire client for a W3C WebDriver hub.
//! - [`reloader`]: the sign-in and reload state machine on top of it.
//!
//! The orchestrator only sees the [`DriverConnector`] and [`ReloadDriver`]
//! traits and the [`AutomationError`] categories. Wire-level failures never
//! leave this module except as the `source` of one of those categories.

pub mod reloader;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod fake;

use std::future::Future;

pub use reloader::{BalanceReloader, DriverState, DriverTimeouts};
pub use webdriver::{Locator, WebDriverClient, WebDriverError};

use crate::models::{Amount, CardNumber};
use crate::secrets::Credentials;
use crate::session::SessionHandle;

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    /// No browser session could be started. Fatal for the batch.
    #[error("could not start a browser session: {0}")]
    ConnectionFailed(#[source] WebDriverError),

    /// Sign-in did not complete, or was never attempted. Fatal for the batch.
    #[error("authentication failed")]
    AuthenticationFailed(#[source] Option<WebDriverError>),

    /// One card could not be reloaded. `card` is masked.
    #[error("reload failed for card {card}")]
    ReloadFailed {
        card: String,
        #[source]
        source: WebDriverError,
    },

    #[error("failed to end browser session: {0}")]
    QuitFailed(#[source] WebDriverError),
}

impl AutomationError {
    pub fn reload_failed(card: &CardNumber, source: WebDriverError) -> Self {
        Self::ReloadFailed {
            card: card.masked(),
            source,
        }
    }

    /// Short description safe to store in the audit log.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "Connection failed",
            Self::AuthenticationFailed(_) => "Authentication failed",
            Self::ReloadFailed { .. } => "Reload failed",
            Self::QuitFailed(_) => "Browser session ended unexpectedly",
        }
    }
}

/// A signed-in (or signing-in) browser bound to one endpoint.
pub trait ReloadDriver: Send {
    fn authenticate(
        &mut self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<(), AutomationError>> + Send;

    fn reload(
        &mut self,
        card: &CardNumber,
        amount: Amount,
    ) -> impl Future<Output = Result<(), AutomationError>> + Send;

    fn quit(self) -> impl Future<Output = Result<(), AutomationError>> + Send;
}

/// Starts drivers against a session endpoint.
pub trait DriverConnector: Send + Sync + 'static {
    type Driver: ReloadDriver + 'static;

    fn connect(
        &self,
        handle: &SessionHandle,
    ) -> impl Future<Output = Result<Self::Driver, AutomationError>> + Send;
}

/// Connects [`BalanceReloader`]s to the WebDriver hub behind a session.
#[derive(Debug, Clone)]
pub struct WebDriverConnector {
    pub headless: bool,
    pub timeouts: DriverTimeouts,
}

impl WebDriverConnector {
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            timeouts: DriverTimeouts::default(),
        }
    }
}

impl DriverConnector for WebDriverConnector {
    type Driver = BalanceReloader;

    async fn connect(&self, handle: &SessionHandle) -> Result<BalanceReloader, AutomationError> {
        let client = WebDriverClient::connect(
            &handle.hub_url(),
            webdriver::chrome_capabilities(self.headless),
        )
        .await
        .map_err(AutomationError::ConnectionFailed)?;

        BalanceReloader::new(client, self.timeouts)
            .await
            .map_err(AutomationError::ConnectionFailed)
    }
}
