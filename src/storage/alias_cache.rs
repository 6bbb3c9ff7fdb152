// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache of card aliases.
//!
//! Aliases live encrypted in the `cards` document, so they can only be
//! resolved while a valid key is at hand. The cache remembers the
//! number → alias mapping from the last successful decryption so that
//! keyless views (the status page) can still show names.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::models::CardNumber;

/// Bounded in-process cache of card number → alias.
pub struct AliasCache {
    cache: Mutex<LruCache<CardNumber, String>>,
}

impl AliasCache {
    /// Create a cache holding at most `capacity` aliases.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Alias for a card, if one was seen since the last invalidation.
    pub fn get(&self, card: &CardNumber) -> Option<String> {
        let mut cache = self.cache.lock().ok()?;
        cache.get(card).cloned()
    }

    /// Record the alias for a card.
    pub fn remember(&self, card: CardNumber, alias: impl Into<String>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(card, alias.into());
        }
    }

    /// Drop every entry. Called whenever the card directory changes.
    pub fn invalidate_all(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// How a card is shown outside the audit view: its alias, else masked.
    pub fn display_name(&self, card: &CardNumber) -> String {
        self.get(card).unwrap_or_else(|| card.masked())
    }
}
