// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persistent Storage
//!
//! Two persisted collections back the service:
//!
//! - **Secret documents**: one encrypted [`SecretDocument`] per logical secret
//!   (`credentials`, `cards`), replaced wholesale on every write.
//! - **Transactions**: the append-only batch audit log, read newest first.
//!
//! Both are reached through traits so that the orchestrator and the secret
//! store can be handed an [`InMemoryStore`] in tests and a [`Database`] in
//! production.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   reloader.redb
//!     secrets        # document name -> JSON SecretDocument
//!     transactions   # inverted start time | id -> JSON Transaction
//! ```

pub mod alias_cache;
pub mod database;
pub mod memory;

pub use alias_cache::AliasCache;
pub use database::Database;
pub use memory::InMemoryStore;

use crate::models::Transaction;
use crate::secrets::SecretDocument;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Another process already holds the database file.
    #[error("database {0} is in use by another process")]
    Locked(String),

    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Named encrypted documents.
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` if it was never written.
    fn load(&self, name: &str) -> StoreResult<Option<SecretDocument>>;

    /// Write a document, replacing any previous contents.
    fn save(&self, name: &str, document: &SecretDocument) -> StoreResult<()>;

    /// Names of every stored document.
    fn names(&self) -> StoreResult<Vec<String>>;

    /// Delete every stored document.
    fn clear(&self) -> StoreResult<()>;
}

/// Append-only batch history.
pub trait TransactionLog: Send + Sync {
    /// Record a finished batch. A record is never rewritten.
    fn append(&self, transaction: &Transaction) -> StoreResult<()>;

    /// Up to `limit` records, newest first.
    fn recent(&self, limit: usize) -> StoreResult<Vec<Transaction>>;

    /// Cheap liveness probe for readiness checks.
    fn health_check(&self) -> StoreResult<()> {
        self.recent(1).map(|_| ())
    }
}
