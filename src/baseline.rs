// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-recipient sync baselines.
//!
//! Each receiver of diffs needs to remember only one thing: the version of
//! its last successful sync. The next diff for that receiver is generated
//! with `from = baseline`, and the baseline advances to `to` only after the
//! diff is produced (and, for a careful caller, delivered).
//!
//! # Baseline Semantics
//!
//! The baseline stores the **last successfully synced** version. A fresh
//! recipient starts at 0, which makes its first diff a full sync (every
//! tracked field has a stamped version `>= 0`).
//!
//! ```text
//! gen_diff(baseline, v) → ship payload → advance(recipient, v)
//!                         (failure here = re-send from the old baseline,
//!                          the re-send branch makes that converge)
//! ```
//!
//! A failed `gen_diff` (invalid range) must never advance a baseline;
//! [`advance`](BaselineStore::advance) enforces the monotonic half of that
//! contract by refusing regressions.
//!
//! Baselines are session state with no persistence requirement; they reset
//! with the process, which simply makes the next sync a full one.

use crate::error::{ReplicationError, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

/// In-memory per-recipient version baselines.
#[derive(Debug, Default)]
pub struct BaselineStore {
    baselines: HashMap<String, u64>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The baseline for a recipient; 0 for a first-time sync.
    pub fn get(&self, recipient: &str) -> u64 {
        self.baselines.get(recipient).copied().unwrap_or(0)
    }

    /// Advance a recipient's baseline after a successful sync.
    ///
    /// Returns the previous baseline. Refuses to move backwards: a lower
    /// version means the caller is replaying a stale or failed diff.
    pub fn advance(&mut self, recipient: &str, version: u64) -> Result<u64> {
        let current = self.get(recipient);
        if version < current {
            warn!(
                recipient,
                current, requested = version, "Refusing baseline regression"
            );
            return Err(ReplicationError::BaselineRegression {
                recipient: recipient.to_string(),
                tracked: current,
                requested: version,
            });
        }
        self.baselines.insert(recipient.to_string(), version);
        debug!(recipient, from = current, to = version, "Baseline advanced");
        Ok(current)
    }

    /// Drop a recipient's baseline, forcing its next sync to be full.
    pub fn reset(&mut self, recipient: &str) {
        if self.baselines.remove(recipient).is_some() {
            debug!(recipient, "Baseline reset, next sync will be full");
        }
    }

    /// Number of recipients with a tracked baseline.
    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    /// Snapshot of all baselines (for diagnostics).
    pub fn all(&self) -> HashMap<String, u64> {
        self.baselines.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_recipient_starts_at_zero() {
        let store = BaselineStore::new();
        assert_eq!(store.get("peer-1"), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_advance_returns_previous() {
        let mut store = BaselineStore::new();
        assert_eq!(store.advance("peer-1", 5).unwrap(), 0);
        assert_eq!(store.advance("peer-1", 9).unwrap(), 5);
        assert_eq!(store.get("peer-1"), 9);
    }

    #[test]
    fn test_advance_to_same_version_allowed() {
        let mut store = BaselineStore::new();
        store.advance("peer-1", 5).unwrap();
        assert_eq!(store.advance("peer-1", 5).unwrap(), 5);
    }

    #[test]
    fn test_regression_refused() {
        let mut store = BaselineStore::new();
        store.advance("peer-1", 10).unwrap();

        let err = store.advance("peer-1", 4).unwrap_err();
        assert_eq!(
            err,
            ReplicationError::BaselineRegression {
                recipient: "peer-1".to_string(),
                tracked: 10,
                requested: 4,
            }
        );
        // Baseline untouched
        assert_eq!(store.get("peer-1"), 10);
    }

    #[test]
    fn test_reset_forces_full_sync() {
        let mut store = BaselineStore::new();
        store.advance("peer-1", 10).unwrap();
        store.reset("peer-1");
        assert_eq!(store.get("peer-1"), 0);
        // Resetting an unknown recipient is a no-op
        store.reset("peer-2");
    }

    #[test]
    fn test_recipients_are_independent() {
        let mut store = BaselineStore::new();
        store.advance("peer-1", 3).unwrap();
        store.advance("peer-2", 8).unwrap();
        assert_eq!(store.get("peer-1"), 3);
        assert_eq!(store.get("peer-2"), 8);
        assert_eq!(store.len(), 2);
        assert_eq!(store.all().len(), 2);
    }
}
