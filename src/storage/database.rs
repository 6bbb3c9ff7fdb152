// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `secrets`: document name → serialized SecretDocument
//! - `transactions`: composite key (!started_at_millis | id) → serialized Transaction

use std::path::Path;

use redb::{ReadableDatabase, ReadableTable, TableDefinition};

use super::{DocumentStore, StoreError, StoreResult, TransactionLog};
use crate::models::Transaction;
use crate::secrets::SecretDocument;

// =============================================================================
// Table Definitions
// =============================================================================

/// Secret documents: name → JSON bytes.
const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Batch history: `inverted_millis_be | uuid` → JSON bytes.
const TRANSACTIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("transactions");

// =============================================================================
// Key Helpers
// =============================================================================

/// Build the transaction key.
///
/// The start time is inverted so that a forward scan yields newest first; the
/// id suffix keeps batches started in the same millisecond distinct.
fn transaction_key(transaction: &Transaction) -> Vec<u8> {
    let millis = transaction.started_at.timestamp_millis().max(0) as u64;
    let mut key = Vec::with_capacity(8 + 16);
    key.extend_from_slice(&(u64::MAX - millis).to_be_bytes());
    key.extend_from_slice(transaction.id.as_bytes());
    key
}

// =============================================================================
// Database
// =============================================================================

/// Embedded ACID store for secrets and batch history.
pub struct Database {
    db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = redb::Database::create(path).map_err(|e| match e {
            redb::DatabaseError::DatabaseAlreadyOpen => {
                StoreError::Locked(path.display().to_string())
            }
            other => StoreError::RedbDatabase(other),
        })?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SECRETS)?;
            let _ = write_txn.open_table(TRANSACTIONS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl DocumentStore for Database {
    fn load(&self, name: &str) -> StoreResult<Option<SecretDocument>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        match table.get(name)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn save(&self, name: &str, document: &SecretDocument) -> StoreResult<()> {
        let json = serde_json::to_vec(document)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            table.insert(name, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn names(&self) -> StoreResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        let mut names = Vec::new();
        for entry in table.iter()? {
            let (name, _) = entry?;
            names.push(name.value().to_string());
        }
        Ok(names)
    }

    fn clear(&self) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            let names: Vec<String> = table
                .iter()?
                .map(|entry| entry.map(|(name, _)| name.value().to_string()))
                .collect::<Result<_, _>>()?;
            for name in &names {
                table.remove(name.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl TransactionLog for Database {
    fn append(&self, transaction: &Transaction) -> StoreResult<()> {
        let key = transaction_key(transaction);
        let json = serde_json::to_vec(transaction)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRANSACTIONS)?;
            if table.get(key.as_slice())?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "Transaction {}",
                    transaction.id
                )));
            }
            table.insert(key.as_slice(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> StoreResult<Vec<Transaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;

        let mut transactions = Vec::with_capacity(limit.min(64));
        for entry in table.iter()? {
            if transactions.len() >= limit {
                break;
            }
            let (_, value) = entry?;
            transactions.push(serde_json::from_slice(value.value())?);
        }
        Ok(transactions)
    }
}

// =============================================================================
// Tests
// =============================================================================
