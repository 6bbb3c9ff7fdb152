// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Offline access session for local development.
//!
//! There is no firewall to open: the WebDriver hub is expected at a fixed
//! address (typically a local container), and `open`/`close` do nothing.

use super::{AccessSession, SessionError, SessionHandle};

#[derive(Debug, Clone)]
pub struct MockSession {
    endpoint: String,
}

impl MockSession {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl AccessSession for MockSession {
    async fn open(&self, _target_tag: &str) -> Result<SessionHandle, SessionError> {
        Ok(SessionHandle::new(self.endpoint.clone()))
    }

    async fn close(&self) -> Result<(), SessionError> {
        Ok(())
    }

    fn is_remote(&self) -> bool {
        false
    }
}
