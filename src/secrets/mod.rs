// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Secret Store
//!
//! Encrypted storage for the site credentials and the card directory.
//!
//! Every leaf of a stored document is sealed under one operator-held
//! [`SecretKey`]. The key itself is never persisted: [`SecretStore::reset_all`]
//! hands a fresh key back exactly once and that key is the only way to read
//! anything written afterwards.
//!
//! ## Documents
//!
//! | Name          | Shape                                 |
//! |---------------|---------------------------------------|
//! | `credentials` | `{ "username": .., "password": .. }`  |
//! | `cards`       | `{ "<alias>": "<16-digit number>" }`  |
//!
//! Field names and nesting are visible at rest; only leaf values are
//! encrypted. This is what lets [`SecretStore::card_names`] work without a key.

pub mod cipher;
pub mod document;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

pub use cipher::{CipherError, EncryptedField, SecretKey};
pub use document::{Document, Node, PlainDocument, SecretDocument};

use crate::models::{CardNumber, ValidationError};
use crate::storage::{AliasCache, DocumentStore, StoreError};

/// Document holding the site sign-in credentials.
pub const CREDENTIALS_DOCUMENT: &str = "credentials";

/// Document holding alias → card number.
pub const CARDS_DOCUMENT: &str = "cards";

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// Wrong key, malformed key or tampered data. Deliberately indistinguishable.
    #[error("Incorrect key or invalid data")]
    Security(#[source] CipherError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("secret storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl From<CipherError> for SecretError {
    fn from(err: CipherError) -> Self {
        Self::Security(err)
    }
}

/// Site sign-in credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Encrypting facade over a [`DocumentStore`].
#[derive(Clone)]
pub struct SecretStore {
    store: Arc<dyn DocumentStore>,
    aliases: Arc<AliasCache>,
}

impl SecretStore {
    pub fn new(store: Arc<dyn DocumentStore>, aliases: Arc<AliasCache>) -> Self {
        Self { store, aliases }
    }

    /// Shared alias cache, populated by [`SecretStore::cards`].
    pub fn aliases(&self) -> &Arc<AliasCache> {
        &self.aliases
    }

    /// Encrypt every leaf of `document` and store it under `name`,
    /// replacing any previous contents.
    pub fn put(
        &self,
        key: &SecretKey,
        name: &str,
        document: &PlainDocument,
    ) -> Result<(), SecretError> {
        let sealed = document::try_map_document(document, &mut |leaf: &String| key.encrypt(leaf))?;
        self.store.save(name, &sealed)?;
        Ok(())
    }

    /// Fetch and decrypt a document. A document never written reads as empty.
    pub fn get(&self, key: &SecretKey, name: &str) -> Result<PlainDocument, SecretError> {
        match self.store.load(name)? {
            Some(sealed) => {
                Ok(document::try_map_document(&sealed, &mut |field: &EncryptedField| {
                    key.decrypt(field)
                })?)
            }
            None => Ok(PlainDocument::new()),
        }
    }

    /// Decrypt every stored document.
    pub fn export(&self, key: &SecretKey) -> Result<BTreeMap<String, PlainDocument>, SecretError> {
        let mut exported = BTreeMap::new();
        for name in self.store.names()? {
            let document = self.get(key, &name)?;
            exported.insert(name, document);
        }
        Ok(exported)
    }

    /// Wipe every secret and start over with new credentials under a fresh key.
    ///
    /// Irreversible. The returned key is the only way back in.
    pub fn reset_all(&self, username: &str, password: &str) -> Result<SecretKey, SecretError> {
        self.store.clear()?;
        self.aliases.invalidate_all();

        let key = SecretKey::generate()?;
        let mut credentials = PlainDocument::new();
        credentials.insert("username".to_string(), username.into());
        credentials.insert("password".to_string(), password.into());
        self.put(&key, CREDENTIALS_DOCUMENT, &credentials)?;

        info!("Secret store reset with new credentials");
        Ok(key)
    }

    /// Decrypt the site credentials.
    ///
    /// Doubles as the key check: a key that cannot open the credentials is
    /// rejected as a security error, as is a store with no credentials at all.
    pub fn credentials(&self, key: &SecretKey) -> Result<Credentials, SecretError> {
        let document = self.get(key, CREDENTIALS_DOCUMENT)?;
        match (
            document::leaf(&document, "username"),
            document::leaf(&document, "password"),
        ) {
            (Some(username), Some(password)) => Ok(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => Err(SecretError::Security(CipherError::Integrity)),
        }
    }

    /// Decrypt the card directory and refresh the alias cache from it.
    ///
    /// Entries that do not hold a valid card number are skipped.
    pub fn cards(&self, key: &SecretKey) -> Result<BTreeMap<String, CardNumber>, SecretError> {
        let document = self.get(key, CARDS_DOCUMENT)?;
        let mut cards = BTreeMap::new();
        for (name, node) in &document {
            let Some(raw) = node.as_leaf() else {
                warn!(alias = %name, "Skipping nested entry in card directory");
                continue;
            };
            match CardNumber::parse(raw) {
                Ok(card) => {
                    self.aliases.remember(card.clone(), name.clone());
                    cards.insert(name.clone(), card);
                }
                Err(_) => warn!(alias = %name, "Skipping malformed card number"),
            }
        }
        Ok(cards)
    }

    /// Card aliases. Needs no key.
    pub fn card_names(&self) -> Result<Vec<String>, SecretError> {
        Ok(self
            .store
            .load(CARDS_DOCUMENT)?
            .map(|document| document.into_keys().collect())
            .unwrap_or_default())
    }

    /// Add one card to the directory.
    ///
    /// The key is checked against the credentials before any input is looked
    /// at, and nothing is written unless the alias is new and the number is
    /// valid.
    pub fn add_card(
        &self,
        key: &SecretKey,
        name: &str,
        number: &str,
    ) -> Result<CardNumber, SecretError> {
        self.credentials(key)?;

        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::new("Card name must not be empty").into());
        }
        let mut sealed = self.store.load(CARDS_DOCUMENT)?.unwrap_or_default();
        if sealed.contains_key(name) {
            return Err(ValidationError::new(format!("Card name {name:?} already exists")).into());
        }
        let card = CardNumber::parse(number)?;

        sealed.insert(name.to_string(), Node::Leaf(key.encrypt(card.as_str())?));
        self.store.save(CARDS_DOCUMENT, &sealed)?;
        self.aliases.invalidate_all();

        info!(alias = %name, card = %card.masked(), "Card added");
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    const CARD: &str = "4111111111111234";

    fn store() -> SecretStore {
        SecretStore::new(Arc::new(InMemoryStore::new()), Arc::new(AliasCache::new(16)))
    }

    fn nested_document() -> PlainDocument {
        let mut inner = PlainDocument::new();
        inner.insert("pin".to_string(), "0000".into());
        let mut doc = PlainDocument::new();
        doc.insert("note".to_string(), "hello".into());
        doc.insert("inner".to_string(), Node::Branch(inner));
        doc
    }

    #[test]
    fn put_then_get_round_trips_nested_documents() {
        let secrets = store();
        let key = SecretKey::generate().unwrap();
        let doc = nested_document();

        secrets.put(&key, "misc", &doc).unwrap();
        assert_eq!(secrets.get(&key, "misc").unwrap(), doc);
    }

    #[test]
    fn stored_leaves_are_not_plaintext() {
        let backing = Arc::new(InMemoryStore::new());
        let secrets = SecretStore::new(backing.clone(), Arc::new(AliasCache::new(4)));
        let key = SecretKey::generate().unwrap();
        secrets.put(&key, "misc", &nested_document()).unwrap();

        let raw = serde_json::to_string(&backing.load("misc").unwrap().unwrap()).unwrap();
        assert!(!raw.contains("hello"));
        assert!(raw.contains("inner"), "Field names stay visible at rest");
    }

    #[test]
    fn wrong_key_is_a_security_error() {
        let secrets = store();
        let key = SecretKey::generate().unwrap();
        secrets.put(&key, "misc", &nested_document()).unwrap();

        let other = SecretKey::generate().unwrap();
        assert!(matches!(
            secrets.get(&other, "misc"),
            Err(SecretError::Security(CipherError::Integrity))
        ));
    }

    #[test]
    fn missing_document_reads_as_empty() {
        let secrets = store();
        let key = SecretKey::generate().unwrap();
        assert!(secrets.get(&key, "nothing").unwrap().is_empty());
    }

    #[test]
    fn reset_all_wipes_and_writes_credentials() {
        let secrets = store();
        let old_key = secrets.reset_all("old@example.com", "old").unwrap();
        secrets.add_card(&old_key, "uber", CARD).unwrap();

        let key = secrets.reset_all("someone@example.com", "hunter2").unwrap();
        assert_ne!(key, old_key);
        assert!(secrets.card_names().unwrap().is_empty());

        let credentials = secrets.credentials(&key).unwrap();
        assert_eq!(credentials.username, "someone@example.com");
        assert_eq!(credentials.password, "hunter2");
        assert!(secrets.credentials(&old_key).is_err());
    }

    #[test]
    fn credentials_without_reset_is_a_security_error() {
        let secrets = store();
        let key = SecretKey::generate().unwrap();
        assert!(matches!(
            secrets.credentials(&key),
            Err(SecretError::Security(_))
        ));
    }

    #[test]
    fn add_card_and_list() {
        let secrets = store();
        let key = secrets.reset_all("u", "p").unwrap();
        secrets.add_card(&key, "uber", CARD).unwrap();
        secrets.add_card(&key, "groceries", "6011000000004321").unwrap();

        assert_eq!(secrets.card_names().unwrap(), vec!["groceries", "uber"]);
        let cards = secrets.cards(&key).unwrap();
        assert_eq!(cards["uber"].as_str(), CARD);

        let exported = secrets.export(&key).unwrap();
        assert_eq!(exported.len(), 2);
        assert_eq!(document::leaf(&exported["cards"], "uber"), Some(CARD));
    }

    #[test]
    fn add_card_checks_key_before_input() {
        let secrets = store();
        secrets.reset_all("u", "p").unwrap();
        let wrong = SecretKey::generate().unwrap();

        // Invalid number, but the wrong key must be reported first.
        assert!(matches!(
            secrets.add_card(&wrong, "uber", "123"),
            Err(SecretError::Security(_))
        ));
        assert!(secrets.card_names().unwrap().is_empty());
    }

    #[test]
    fn add_card_rejects_collisions_and_bad_numbers() {
        let secrets = store();
        let key = secrets.reset_all("u", "p").unwrap();
        secrets.add_card(&key, "uber", CARD).unwrap();

        assert!(matches!(
            secrets.add_card(&key, "uber", "6011000000004321"),
            Err(SecretError::Validation(_))
        ));
        assert!(matches!(
            secrets.add_card(&key, "short", "411111111111123"),
            Err(SecretError::Validation(_))
        ));
        assert!(matches!(
            secrets.add_card(&key, "letters", "41111111111112ab"),
            Err(SecretError::Validation(_))
        ));
        assert!(matches!(
            secrets.add_card(&key, "  ", CARD),
            Err(SecretError::Validation(_))
        ));
        assert_eq!(secrets.card_names().unwrap(), vec!["uber"]);
    }

    #[test]
    fn cards_populate_alias_cache_and_add_card_invalidates() {
        let secrets = store();
        let key = secrets.reset_all("u", "p").unwrap();
        let card = secrets.add_card(&key, "uber", CARD).unwrap();
        assert_eq!(secrets.aliases().display_name(&card), "**** **** **** 1234");

        secrets.cards(&key).unwrap();
        assert_eq!(secrets.aliases().display_name(&card), "uber");

        secrets.add_card(&key, "other", "6011000000004321").unwrap();
        assert!(secrets.aliases().get(&card).is_none());
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let credentials = Credentials {
            username: "u".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }
}
