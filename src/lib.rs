// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Balance Reloader - batch balance top-ups through a scoped remote browser
//!
//! Reloads a fixed set of payment cards through the target site's own web UI,
//! driven over WebDriver on a remote instance that is only reachable while a
//! batch runs. Site credentials and card numbers are stored encrypted under
//! an operator-held key.
//!
//! ## Modules
//!
//! - `secrets` - Per-field encrypted secret documents
//! - `session` - Scoped network access to the automation endpoint
//! - `automation` - WebDriver client and the reload flow
//! - `batch` - Batch orchestration and audit records
//! - `storage` - redb persistence and the alias cache
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod automation;
pub mod batch;
pub mod config;
pub mod error;
pub mod models;
pub mod secrets;
pub mod session;
pub mod state;
pub mod storage;
pub mod telemetry;
