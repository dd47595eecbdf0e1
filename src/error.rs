// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication core.
//!
//! Expected control flow is never an error: "no changes in range" is a value
//! (`Ok(None)` from [`gen_diff`](crate::node::ReplicationNode::gen_diff)), and
//! a per-field apply skip is reported in the
//! [`ApplyReport`](crate::apply::ApplyReport) rather than raised. Only genuinely
//! invalid preconditions surface as errors.
//!
//! # Error Categories
//!
//! | Error Type | Recoverable | Description |
//! |------------|-------------|-------------|
//! | `InvalidRange` | No | `to < from` passed to `gen_diff`; caller must not advance its baseline |
//! | `BaselineRegression` | No | Attempt to move a recipient's baseline backwards |
//! | `SchemaMismatch` | Yes | Nested diff payload for a non-object target field; that field is skipped |
//! | `Registry` | No | Invalid field registration |
//!
//! # Recovery Behavior
//!
//! Use [`ReplicationError::is_recoverable()`] to decide whether siblings can
//! still make progress. Recoverable errors affect a single field and are
//! reported alongside a partial result. Non-recoverable errors indicate a bug
//! in the caller (bad version ordering, misuse of a failed diff).

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur in the replication core.
///
/// Use [`is_recoverable()`](Self::is_recoverable) to check whether the
/// operation can continue past the failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicationError {
    /// Version range with `to < from` passed to `gen_diff`.
    ///
    /// Distinct from "no changes in range": the caller must not treat this as
    /// an empty diff and must not advance its tracked baseline.
    #[error("Invalid version range: from {from} > to {to}")]
    InvalidRange { from: u64, to: u64 },

    /// A recipient baseline was asked to move backwards.
    ///
    /// Baselines are monotonic: advancing to a version below the tracked one
    /// means the caller is replaying a stale or failed diff.
    #[error("Baseline regression for {recipient}: tracked {tracked}, requested {requested}")]
    BaselineRegression {
        recipient: String,
        tracked: u64,
        requested: u64,
    },

    /// Diff payload carries a nested mapping for a field whose target
    /// counterpart is not an object.
    ///
    /// Recoverable: the field is skipped, siblings still apply.
    #[error("Schema mismatch at {path}: nested payload but target holds {actual}")]
    SchemaMismatch { path: String, actual: String },

    /// Invalid field registration (e.g. empty field name).
    #[error("Registry error: {0}")]
    Registry(String),
}

impl ReplicationError {
    /// Check if the surrounding operation can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidRange { .. } => false,
            Self::BaselineRegression { .. } => false,
            Self::SchemaMismatch { .. } => true, // Skip the field, apply siblings
            Self::Registry(_) => false,
        }
    }
}
