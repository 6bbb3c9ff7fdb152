// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::STATUS_PAGE_LIMIT;
use crate::error::ApiError;
use crate::models::{CardNumber, Transaction};
use crate::state::AppState;

/// A transaction with card numbers replaced by display names.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionView {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Ran on managed hosting
    pub managed_infrastructure: bool,
    /// Used a real remote session
    pub remote_session: bool,
    /// Masked numbers (`**** **** **** 1234`) or aliases, in batch order
    pub cards: Vec<String>,
    /// Amount per card, two decimals
    pub amount: String,
    /// Per-card outcome, same order as `cards`
    pub succeeded: Vec<bool>,
    pub failure_details: Vec<Option<String>>,
}

impl TransactionView {
    pub fn new(transaction: &Transaction, display: impl Fn(&CardNumber) -> String) -> Self {
        Self {
            id: transaction.id,
            started_at: transaction.started_at,
            finished_at: transaction.finished_at,
            managed_infrastructure: transaction.managed_infrastructure,
            remote_session: transaction.remote_session,
            cards: transaction.cards.iter().map(display).collect(),
            amount: transaction.amount.to_string(),
            succeeded: transaction.succeeded.clone(),
            failure_details: transaction.failure_details.clone(),
        }
    }

    /// Every card masked, whatever aliases are known.
    pub fn masked(transaction: &Transaction) -> Self {
        Self::new(transaction, CardNumber::masked)
    }
}

/// Status page contents.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    /// Names of the cards on file
    pub cards: Vec<String>,
    /// Most recent batches, newest first
    pub transactions: Vec<TransactionView>,
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Status",
    responses(
        (status = 200, description = "Cards on file and recent batches", body = StatusResponse)
    )
)]
pub async fn index(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let cards = state.secrets().card_names().map_err(|e| {
        error!(error = %e, "Failed to list cards");
        ApiError::internal("Failed to list cards")
    })?;
    let recent = state.transactions.recent(STATUS_PAGE_LIMIT).map_err(|e| {
        error!(error = %e, "Failed to list transactions");
        ApiError::internal("Failed to list transactions")
    })?;

    let aliases = state.secrets().aliases();
    let transactions = recent
        .iter()
        .map(|tx| TransactionView::new(tx, |card| aliases.display_name(card)))
        .collect();

    Ok(Json(StatusResponse {
        cards,
        transactions,
    }))
}
