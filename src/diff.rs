// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The diff payload: what changed for a node across a version range.
//!
//! A [`Diff`] is an order-irrelevant mapping from field name to a
//! [`DiffEntry`], which is a scalar, an opaque blob, or a nested diff
//! mirroring the shape of the replicated subtree that changed.
//!
//! # Sentinel vs. Empty
//!
//! Two results that look similar are deliberately distinct:
//!
//! - `Ok(None)` from `gen_diff`: **no applicable changes** for the requested
//!   range. Never serialized; the generator substitutes omission at every
//!   level, so the sentinel never reaches the wire.
//! - `Ok(Some(Diff::new()))`: the node is tracked and **in sync**, nothing to
//!   add. A valid payload.
//!
//! # Wire Shape
//!
//! The payload serializes to the natural recursive form
//! `mapping<string, scalar | blob | diff>`:
//!
//! ```json
//! { "a": 1, "b": { "c": 2 }, "tags": ["x", "y"] }
//! ```
//!
//! The untagged encoding means an object-shaped blob is indistinguishable from
//! a nested diff on decode; blobs are meant for list-like wholesale-replace
//! data, which decodes unambiguously.

use crate::value::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One field's update inside a diff payload.
///
/// Untagged: serializes as the value itself. Decode order matters: scalars
/// first, then nested mappings, then arbitrary blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiffEntry {
    /// Scalar update.
    Scalar(Scalar),
    /// Nested diff for a replicated child subtree.
    Nested(Diff),
    /// Opaque blob, replaced wholesale on the receiver.
    Blob(serde_json::Value),
}

impl DiffEntry {
    /// Short kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DiffEntry::Scalar(_) => "scalar",
            DiffEntry::Nested(_) => "nested",
            DiffEntry::Blob(_) => "blob",
        }
    }

    /// Returns the nested diff, if this entry holds one.
    pub fn as_nested(&self) -> Option<&Diff> {
        match self {
            DiffEntry::Nested(diff) => Some(diff),
            _ => None,
        }
    }

    /// Returns the scalar, if this entry holds one.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            DiffEntry::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }
}

/// A diff payload for one node across a version range.
///
/// Absence of a key means "no update for that field in this range".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diff {
    entries: BTreeMap<String, DiffEntry>,
}

impl Diff {
    /// Create an empty payload ("in sync, nothing to add").
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an update for a field.
    pub fn insert(&mut self, field: impl Into<String>, entry: DiffEntry) {
        self.entries.insert(field.into(), entry);
    }

    /// Look up the update for a field.
    pub fn get(&self, field: &str) -> Option<&DiffEntry> {
        self.entries.get(field)
    }

    /// Whether the payload carries an update for `field`.
    pub fn contains_field(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    /// Number of fields updated.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no fields are updated (in sync, not the no-changes sentinel).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate updates in deterministic field order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DiffEntry)> {
        self.entries.iter()
    }

    /// Total number of leaf updates, counting nested payloads recursively.
    pub fn leaf_count(&self) -> usize {
        self.entries
            .values()
            .map(|entry| match entry {
                DiffEntry::Nested(sub) => sub.leaf_count(),
                _ => 1,
            })
            .sum()
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = (&'a String, &'a DiffEntry);
    type IntoIter = std::collections::btree_map::Iter<'a, String, DiffEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(String, DiffEntry)> for Diff {
    fn from_iter<I: IntoIterator<Item = (String, DiffEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
