// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::status::TransactionView;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReloadQuery {
    /// Secret key returned by the last reset
    pub key: Option<String>,
    /// Comma-separated 16-digit card numbers or card names
    pub cards: Option<String>,
    /// Amount per card, e.g. `0.50`
    pub amount: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReloadAllQuery {
    /// Secret key returned by the last reset
    pub key: Option<String>,
    /// Amount per card, e.g. `0.50`
    pub amount: Option<String>,
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Missing query parameter: {name}")))
}

fn split_cards(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}

/// Reload the listed cards.
#[utoipa::path(
    get,
    path = "/reload",
    tag = "Reload",
    params(ReloadQuery),
    responses(
        (status = 200, description = "Batch recorded; see per-card outcome", body = TransactionView),
        (status = 400, description = "Invalid amount or cards"),
        (status = 403, description = "Incorrect key or invalid data")
    )
)]
pub async fn reload(
    State(state): State<AppState>,
    Query(query): Query<ReloadQuery>,
) -> Result<Json<TransactionView>, ApiError> {
    let key = required(query.key, "key")?;
    let amount = required(query.amount, "amount")?;
    let cards = split_cards(query.cards.as_deref().unwrap_or_default());
    if cards.is_empty() {
        return Err(ApiError::bad_request("At least one card is required"));
    }

    let transaction = state.runner.run_batch(&key, &cards, &amount).await?;
    Ok(Json(TransactionView::masked(&transaction)))
}

/// Reload every card on file.
#[utoipa::path(
    get,
    path = "/reloadAll",
    tag = "Reload",
    params(ReloadAllQuery),
    responses(
        (status = 200, description = "Batch recorded; see per-card outcome", body = TransactionView),
        (status = 400, description = "Invalid amount or no cards on file"),
        (status = 403, description = "Incorrect key or invalid data")
    )
)]
pub async fn reload_all(
    State(state): State<AppState>,
    Query(query): Query<ReloadAllQuery>,
) -> Result<Json<TransactionView>, ApiError> {
    let key = required(query.key, "key")?;
    let amount = required(query.amount, "amount")?;

    let transaction = state.runner.run_all(&key, &amount).await?;
    Ok(Json(TransactionView::masked(&transaction)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cards_are_split_and_trimmed() {
        assert_eq!(
            split_cards(" 4111111111111234, travel ,,"),
            vec!["4111111111111234", "travel"]
        );
        assert!(split_cards(" , ").is_empty());
    }

    #[test]
    fn blank_parameters_are_missing() {
        assert!(required(Some("  ".into()), "key").is_err());
        assert!(required(None, "key").is_err());
        assert_eq!(required(Some("k".into()), "key").unwrap(), "k");
    }
}
