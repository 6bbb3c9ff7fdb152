// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::automation::WebDriverConnector;
use crate::batch::BatchRunner;
use crate::secrets::SecretStore;
use crate::session::SessionProvider;
use crate::storage::TransactionLog;

/// The orchestrator as wired in production.
pub type Runner = BatchRunner<SessionProvider, WebDriverConnector>;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
    pub transactions: Arc<dyn TransactionLog>,
}

impl AppState {
    pub fn new(runner: Runner, transactions: Arc<dyn TransactionLog>) -> Self {
        Self {
            runner: Arc::new(runner),
            transactions,
        }
    }

    pub fn secrets(&self) -> &SecretStore {
        self.runner.secrets()
    }
}
