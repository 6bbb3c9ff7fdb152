// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Domain Models
//!
//! Value types shared by the secret store, the automation driver, the batch
//! orchestrator and the HTTP surface. Every type here is validated on
//! construction, so a [`CardNumber`] or [`Amount`] that exists is known to be
//! well-formed.
//!
//! ## Model Categories
//!
//! - **Inputs**: [`CardNumber`], [`Amount`], [`ReloadRequest`]
//! - **Outputs**: [`ReloadResult`], [`Transaction`] (the append-only audit record)

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of digits in a full card number.
pub const CARD_NUMBER_DIGITS: usize = 16;

/// Malformed or out-of-range input. Always a client-facing rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

// =============================================================================
// Card Number
// =============================================================================

/// A full 16-digit payment card number.
///
/// The remote UI only ever shows the last four digits, so [`CardNumber::last4`]
/// is what the driver uses to pick the card on screen. Use
/// [`CardNumber::masked`] whenever the number leaves the process.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardNumber(String);

impl CardNumber {
    /// Parse a card number, rejecting anything that is not exactly 16 ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.len() != CARD_NUMBER_DIGITS || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::new(format!(
                "Card numbers must be exactly {CARD_NUMBER_DIGITS} digits"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Whether `raw` is a well-formed card number.
    pub fn is_valid(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last four digits, as displayed by the remote UI.
    pub fn last4(&self) -> &str {
        &self.0[CARD_NUMBER_DIGITS - 4..]
    }

    /// Display form with everything but the last four digits hidden.
    pub fn masked(&self) -> String {
        mask_last4(self.last4())
    }
}

/// Render `**** **** **** 1234` for the given suffix.
pub fn mask_last4(last4: &str) -> String {
    format!("**** **** **** {last4}")
}

// Debug is masked too so a stray `{:?}` never leaks the full number.
impl fmt::Debug for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardNumber({})", self.masked())
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl FromStr for CardNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CardNumber {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CardNumber> for String {
    fn from(value: CardNumber) -> Self {
        value.0
    }
}

// =============================================================================
// Amount
// =============================================================================

/// A strictly positive currency amount with at most two decimal places.
///
/// Held as integer cents so that formatting back to the UI is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount {
    cents: u64,
}

impl Amount {
    /// Parse a decimal string such as `"5"`, `"0.5"` or `"12.25"`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        let invalid = || ValidationError::new(format!("Invalid amount: {raw:?}"));

        let (whole, fraction) = match raw.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (raw, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        if fraction.len() > 2 {
            return Err(ValidationError::new(
                "Amounts support at most two decimal places",
            ));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let fraction: u64 = if fraction.is_empty() {
            0
        } else {
            format!("{fraction:0<2}").parse().map_err(|_| invalid())?
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(invalid)?;

        Self::from_cents(cents)
    }

    /// Build an amount from cents, rejecting zero.
    pub fn from_cents(cents: u64) -> Result<Self, ValidationError> {
        if cents == 0 {
            return Err(ValidationError::new("Amount must be greater than zero"));
        }
        Ok(Self { cents })
    }

    pub fn cents(&self) -> u64 {
        self.cents
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

impl FromStr for Amount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Amount {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.to_string()
    }
}

// =============================================================================
// Reload Models
// =============================================================================

/// One card to top up by a fixed amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub card: CardNumber,
    pub amount: Amount,
}

impl ReloadRequest {
    pub fn new(card: CardNumber, amount: Amount) -> Self {
        Self { card, amount }
    }
}

/// Outcome of a single reload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadResult {
    pub card: CardNumber,
    pub amount: Amount,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

impl ReloadResult {
    pub fn success(request: &ReloadRequest) -> Self {
        Self {
            card: request.card.clone(),
            amount: request.amount,
            succeeded: true,
            failure_detail: None,
        }
    }

    pub fn failure(request: &ReloadRequest, detail: impl Into<String>) -> Self {
        Self {
            card: request.card.clone(),
            amount: request.amount,
            succeeded: false,
            failure_detail: Some(detail.into()),
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Immutable audit record of one completed batch.
///
/// `cards`, `succeeded` and `failure_details` are parallel vectors in input
/// order. Card numbers are stored by value so later alias changes never alter
/// history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The batch ran on managed hosting rather than a developer machine.
    pub managed_infrastructure: bool,
    /// The batch used a real remote session rather than the mock.
    pub remote_session: bool,
    pub cards: Vec<CardNumber>,
    pub amount: Amount,
    pub succeeded: Vec<bool>,
    #[serde(default)]
    pub failure_details: Vec<Option<String>>,
}

impl Transaction {
    /// Assemble the record for a finished batch from its ordered results.
    pub fn from_results(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        managed_infrastructure: bool,
        remote_session: bool,
        amount: Amount,
        results: &[ReloadResult],
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            finished_at,
            managed_infrastructure,
            remote_session,
            cards: results.iter().map(|r| r.card.clone()).collect(),
            amount,
            succeeded: results.iter().map(|r| r.succeeded).collect(),
            failure_details: results.iter().map(|r| r.failure_detail.clone()).collect(),
        }
    }

    /// Whether every card in the batch was reloaded.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded.iter().all(|s| *s)
    }
}
