// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Batch Orchestrator
//!
//! Runs one list of reloads under one access session and one signed-in
//! browser, then appends a [`Transaction`] describing the outcome.
//!
//! ## Flow
//!
//! 1. Validate the amount and card identifiers. Nothing is touched on failure.
//! 2. Unlock credentials with the caller's key. Any key problem is reported as
//!    a single security error, never before [`SECURITY_DELAY`] has elapsed
//!    since the call started.
//! 3. Acquire the access session, connect a driver, sign in once.
//! 4. Reload each card in order. A failed card is recorded and the batch moves
//!    on; a failure that loses the session marks every remaining card failed.
//! 5. Quit the driver, release the session, append the transaction.
//!
//! Steps 3 to 5 always produce a transaction, even when nothing was reloaded.
//! They run on a task of their own: a caller that stops waiting (a dropped
//! HTTP request, for instance) does not cut the batch short, so the browser
//! is still quit and the transaction still recorded.
//!
//! [`BatchRunner::run_all`] checks the key before looking at the card
//! directory, so an unauthenticated caller cannot tell whether cards exist.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinError;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};

use crate::automation::{AutomationError, DriverConnector, ReloadDriver};
use crate::models::{Amount, CardNumber, ReloadRequest, ReloadResult, Transaction, ValidationError};
use crate::secrets::{CipherError, Credentials, SecretError, SecretKey, SecretStore};
use crate::session::{AccessSession, SessionGuard, SessionHandle};
use crate::storage::{StoreError, TransactionLog};

/// Minimum time before a rejected key is reported.
pub const SECURITY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Incorrect key or invalid data")]
    Security(#[source] CipherError),

    #[error("batch storage failure: {0}")]
    Storage(#[from] StoreError),

    /// The batch task panicked or was aborted by the runtime.
    #[error("batch task ended abnormally: {0}")]
    Interrupted(#[source] JoinError),
}

impl From<SecretError> for BatchError {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::Security(cause) => Self::Security(cause),
            SecretError::Validation(cause) => Self::Validation(cause),
            SecretError::Storage(cause) => Self::Storage(cause),
        }
    }
}

fn fail_all(requests: &[ReloadRequest], detail: &str) -> Vec<ReloadResult> {
    requests
        .iter()
        .map(|request| ReloadResult::failure(request, detail))
        .collect()
}

/// Everything a key unlocks.
struct Unlocked {
    credentials: Credentials,
    cards: BTreeMap<String, CardNumber>,
}

/// Composes secrets, access session and driver into audited batches.
pub struct BatchRunner<S, C> {
    secrets: SecretStore,
    executor: Arc<Executor<S, C>>,
    security_delay: Duration,
}

/// The session-holding part of a batch. Shared with the task that runs it.
struct Executor<S, C> {
    transactions: Arc<dyn TransactionLog>,
    session: Arc<S>,
    connector: C,
    target_tag: String,
    managed_infrastructure: bool,
}

impl<S: AccessSession, C: DriverConnector> BatchRunner<S, C> {
    pub fn new(
        secrets: SecretStore,
        transactions: Arc<dyn TransactionLog>,
        session: Arc<S>,
        connector: C,
        target_tag: impl Into<String>,
        managed_infrastructure: bool,
    ) -> Self {
        Self {
            secrets,
            executor: Arc::new(Executor {
                transactions,
                session,
                connector,
                target_tag: target_tag.into(),
                managed_infrastructure,
            }),
            security_delay: SECURITY_DELAY,
        }
    }

    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    /// Reload every card on file.
    pub async fn run_all(&self, key: &str, amount: &str) -> Result<Transaction, BatchError> {
        let deadline = Instant::now() + self.security_delay;

        let amount = Amount::parse(amount)?;
        let unlocked = self.unlock_or_delay(key, deadline).await?;
        if unlocked.cards.is_empty() {
            return Err(ValidationError::new("No cards on file").into());
        }

        let requests = unlocked
            .cards
            .values()
            .map(|card| ReloadRequest::new(card.clone(), amount))
            .collect();
        self.execute(unlocked.credentials, requests, amount).await
    }

    /// Reload `cards` by `amount`.
    ///
    /// Each card is either a 16-digit number or the name of a card on file.
    pub async fn run_batch(
        &self,
        key: &str,
        cards: &[String],
        amount: &str,
    ) -> Result<Transaction, BatchError> {
        let deadline = Instant::now() + self.security_delay;

        let amount = Amount::parse(amount)?;
        self.validate_cards(cards)?;
        let unlocked = self.unlock_or_delay(key, deadline).await?;

        let requests = cards
            .iter()
            .map(|card| resolve_card(card, &unlocked.cards).map(|c| ReloadRequest::new(c, amount)))
            .collect::<Result<Vec<_>, _>>()?;

        self.execute(unlocked.credentials, requests, amount).await
    }

    fn validate_cards(&self, cards: &[String]) -> Result<(), BatchError> {
        if cards.is_empty() {
            return Err(ValidationError::new("At least one card is required").into());
        }
        let mut names: Option<Vec<String>> = None;
        for (position, card) in cards.iter().enumerate() {
            if CardNumber::is_valid(card) {
                continue;
            }
            if names.is_none() {
                names = Some(self.secrets.card_names()?);
            }
            if !names.iter().flatten().any(|name| name == card) {
                return Err(ValidationError::new(format!(
                    "Card {} is neither a 16-digit number nor a card on file",
                    position + 1
                ))
                .into());
            }
        }
        Ok(())
    }

    fn unlock(&self, key: &str) -> Result<Unlocked, SecretError> {
        let key = SecretKey::parse(key)?;
        let credentials = self.secrets.credentials(&key)?;
        let cards = self.secrets.cards(&key)?;
        Ok(Unlocked { credentials, cards })
    }

    /// Unlock with `key`, holding any security error back until `deadline`.
    async fn unlock_or_delay(&self, key: &str, deadline: Instant) -> Result<Unlocked, BatchError> {
        match self.unlock(key) {
            Ok(unlocked) => Ok(unlocked),
            Err(SecretError::Security(cause)) => {
                sleep_until(deadline).await;
                warn!("Batch rejected: key did not unlock credentials");
                Err(BatchError::Security(cause))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Run steps 3 to 5 on their own task and wait for the transaction.
    async fn execute(
        &self,
        credentials: Credentials,
        requests: Vec<ReloadRequest>,
        amount: Amount,
    ) -> Result<Transaction, BatchError> {
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move { executor.run(&credentials, &requests, amount).await })
            .await
            .map_err(BatchError::Interrupted)?
    }
}

impl<S: AccessSession, C: DriverConnector> Executor<S, C> {
    async fn run(
        &self,
        credentials: &Credentials,
        requests: &[ReloadRequest],
        amount: Amount,
    ) -> Result<Transaction, BatchError> {
        let started_at = Utc::now();
        info!(cards = requests.len(), %amount, "Batch started");

        let results = match SessionGuard::acquire(Arc::clone(&self.session), &self.target_tag).await {
            Ok(guard) => {
                let results = self.drive(guard.handle(), credentials, requests).await;
                if let Err(err) = guard.release().await {
                    warn!(error = %err, "Failed to release access session");
                }
                results
            }
            Err(err) => {
                error!(error = %err, "Could not acquire access session");
                fail_all(requests, "Session acquisition failed")
            }
        };

        let transaction = Transaction::from_results(
            started_at,
            Utc::now(),
            self.managed_infrastructure,
            self.session.is_remote(),
            amount,
            &results,
        );
        if let Err(err) = self.transactions.append(&transaction) {
            error!(id = %transaction.id, error = %err, "Failed to record transaction");
            return Err(err.into());
        }

        let succeeded = transaction.succeeded.iter().filter(|s| **s).count();
        info!(
            id = %transaction.id,
            succeeded,
            failed = transaction.succeeded.len() - succeeded,
            "Batch finished"
        );
        Ok(transaction)
    }

    async fn drive(
        &self,
        handle: &SessionHandle,
        credentials: &Credentials,
        requests: &[ReloadRequest],
    ) -> Vec<ReloadResult> {
        let mut driver = match self.connector.connect(handle).await {
            Ok(driver) => driver,
            Err(err) => {
                error!(error = %err, "Could not connect to automation endpoint");
                return fail_all(requests, err.summary());
            }
        };

        let results = match driver.authenticate(credentials).await {
            Ok(()) => reload_each(&mut driver, requests).await,
            Err(err) => {
                error!(error = %err, "Sign-in failed, no card will be attempted");
                fail_all(requests, err.summary())
            }
        };

        if let Err(err) = driver.quit().await {
            warn!(error = %err, "Failed to end browser session");
        }
        results
    }
}

async fn reload_each<D: ReloadDriver>(driver: &mut D, requests: &[ReloadRequest]) -> Vec<ReloadResult> {
    let mut results = Vec::with_capacity(requests.len());
    for (index, request) in requests.iter().enumerate() {
        match driver.reload(&request.card, request.amount).await {
            Ok(()) => results.push(ReloadResult::success(request)),
            Err(err @ AutomationError::ReloadFailed { .. }) => {
                results.push(ReloadResult::failure(request, err.summary()));
            }
            Err(err) => {
                error!(error = %err, "Browser session lost mid-batch");
                results.extend(fail_all(&requests[index..], err.summary()));
                break;
            }
        }
    }
    results
}

fn resolve_card(
    card: &str,
    on_file: &BTreeMap<String, CardNumber>,
) -> Result<CardNumber, ValidationError> {
    match on_file.get(card) {
        Some(number) => Ok(number.clone()),
        None => CardNumber::parse(card),
    }
}
