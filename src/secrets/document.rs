// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Nested key-value documents with a uniform leaf type.
//!
//! A plain document has `String` leaves; its encrypted counterpart has
//! [`EncryptedField`](super::cipher::EncryptedField) leaves. Converting one
//! into the other is a structural walk that only touches leaves, so field
//! names and nesting survive unchanged.
//!
//! On the wire both shapes are plain JSON objects: a leaf is whatever its
//! type serializes to, a branch is an object of further nodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::cipher::EncryptedField;

/// Field name to node mapping.
pub type Document<L> = BTreeMap<String, Node<L>>;

/// Document as entered by an operator.
pub type PlainDocument = Document<String>;

/// Document as persisted: every leaf encrypted under the same key.
pub type SecretDocument = Document<EncryptedField>;

/// One entry in a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node<L> {
    Leaf(L),
    Branch(Document<L>),
}

impl<L> Node<L> {
    /// Rebuild this node with every leaf passed through `f`.
    ///
    /// The first error aborts the walk.
    pub fn try_map_leaves<M, E, F>(&self, f: &mut F) -> Result<Node<M>, E>
    where
        F: FnMut(&L) -> Result<M, E>,
    {
        match self {
            Node::Leaf(leaf) => f(leaf).map(Node::Leaf),
            Node::Branch(children) => try_map_document(children, f).map(Node::Branch),
        }
    }

    pub fn as_leaf(&self) -> Option<&L> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Branch(_) => None,
        }
    }
}

impl From<&str> for Node<String> {
    fn from(value: &str) -> Self {
        Node::Leaf(value.to_string())
    }
}

impl From<String> for Node<String> {
    fn from(value: String) -> Self {
        Node::Leaf(value)
    }
}

/// Apply [`Node::try_map_leaves`] to every entry of a document.
pub fn try_map_document<L, M, E, F>(document: &Document<L>, f: &mut F) -> Result<Document<M>, E>
where
    F: FnMut(&L) -> Result<M, E>,
{
    let mut mapped = BTreeMap::new();
    for (name, node) in document {
        mapped.insert(name.clone(), node.try_map_leaves(f)?);
    }
    Ok(mapped)
}

/// Look up a top-level leaf by field name.
pub fn leaf<'a>(document: &'a PlainDocument, field: &str) -> Option<&'a str> {
    document
        .get(field)
        .and_then(Node::as_leaf)
        .map(String::as_str)
}
