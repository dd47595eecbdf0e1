// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Change tracking (field mutations, bubbled notifications)
//! - Diff generation (payload sizes, no-change results, rejected ranges)
//! - Lazy instrumentation
//! - Diff application (applied/handled/skipped fields)
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replication_` and follow Prometheus
//! conventions: counters end in `_total`, histograms track distributions.
//! The crate emits through the `metrics` facade; the host wires a recorder.

use metrics::{counter, histogram};

/// Record an accepted field change (no-op writes are not counted).
pub fn record_field_change() {
    counter!("replication_field_changes_total").increment(1);
}

/// Record a dirty signal bubbled to a parent (latch flip).
pub fn record_bubble() {
    counter!("replication_bubble_notifications_total").increment(1);
}

/// Record a generated diff and its top-level field count.
pub fn record_diff_generated(fields: usize) {
    counter!("replication_diffs_generated_total").increment(1);
    histogram!("replication_diff_fields").record(fields as f64);
}

/// Record a "no changes in range" result.
pub fn record_no_change_diff() {
    counter!("replication_no_change_diffs_total").increment(1);
}

/// Record a rejected (inverted) version range.
pub fn record_invalid_range() {
    counter!("replication_invalid_ranges_total").increment(1);
}

/// Record a one-shot lazy instrumentation pass.
pub fn record_lazy_install(fields: usize) {
    counter!("replication_lazy_installs_total").increment(1);
    counter!("replication_lazy_installed_fields_total").increment(fields as u64);
}

/// Record the outcome of one apply pass.
pub fn record_apply(applied: usize, handled: usize, skipped: usize) {
    counter!("replication_apply_fields_applied_total").increment(applied as u64);
    counter!("replication_apply_fields_handled_total").increment(handled as u64);
    if skipped > 0 {
        counter!("replication_apply_fields_skipped_total").increment(skipped as u64);
    }
}

/// Record a schema mismatch skipped during apply.
pub fn record_schema_mismatch() {
    counter!("replication_schema_mismatches_total").increment(1);
}
