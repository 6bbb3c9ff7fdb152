// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory store for tests and throwaway local runs.
//!
//! Behaves like [`Database`](super::Database) for every trait method but keeps
//! nothing across restarts.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{DocumentStore, StoreError, StoreResult, TransactionLog};
use crate::models::Transaction;
use crate::secrets::SecretDocument;

#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<BTreeMap<String, SecretDocument>>,
    transactions: RwLock<Vec<Transaction>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryStore {
    fn load(&self, name: &str) -> StoreResult<Option<SecretDocument>> {
        let documents = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        Ok(documents.get(name).cloned())
    }

    fn save(&self, name: &str, document: &SecretDocument) -> StoreResult<()> {
        let mut documents = self.documents.write().map_err(|_| StoreError::Poisoned)?;
        documents.insert(name.to_string(), document.clone());
        Ok(())
    }

    fn names(&self) -> StoreResult<Vec<String>> {
        let documents = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        Ok(documents.keys().cloned().collect())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut documents = self.documents.write().map_err(|_| StoreError::Poisoned)?;
        documents.clear();
        Ok(())
    }
}

impl TransactionLog for InMemoryStore {
    fn append(&self, transaction: &Transaction) -> StoreResult<()> {
        let mut transactions = self
            .transactions
            .write()
            .map_err(|_| StoreError::Poisoned)?;
        if transactions.iter().any(|t| t.id == transaction.id) {
            return Err(StoreError::AlreadyExists(format!(
                "Transaction {}",
                transaction.id
            )));
        }
        transactions.push(transaction.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> StoreResult<Vec<Transaction>> {
        let transactions = self
            .transactions
            .read()
            .map_err(|_| StoreError::Poisoned)?;
        let mut listed: Vec<Transaction> = transactions.clone();
        listed.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        listed.truncate(limit);
        Ok(listed)
    }
}
