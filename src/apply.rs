// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Diff application: merging a payload into an external target.
//!
//! The applier walks a [`Diff`] and merges it into an arbitrary target
//! through the [`ApplyTarget`] trait. Per field:
//!
//! 1. A registered **handler** under the key consumes the value: the field
//!    is an event sink rather than a stored value (node/component-identifier
//!    style fields resolved by the receiver's own lookup).
//! 2. A **nested payload** recurses into the target's nested object in place,
//!    then reassigns it onto the target. The reassignment matters: the
//!    external field may itself be instrumented to intercept writes. A
//!    missing target field materializes a fresh nested object.
//! 3. Anything else is **assigned** directly.
//!
//! # Partial Application
//!
//! A nested payload against a non-object target field fails for that field
//! only: it is logged at warn level and recorded in the [`ApplyReport`], and
//! the remaining fields still apply. Non-atomic: one unreachable
//! field should not block a consistent update of its siblings.
//!
//! [`MirrorObject`] is the stock target: a field map plus per-field handlers
//! and an optional write hook observing every assignment.

use crate::diff::{Diff, DiffEntry};
use crate::error::ReplicationError;
use crate::metrics;
use crate::value::Scalar;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// What the target holds under a field the diff wants to recurse into.
pub enum FieldSlot<T> {
    /// A nested object, detached for in-place application.
    Object(T),
    /// Nothing yet; the applier materializes a fresh object.
    Missing,
    /// Something that is not an object (kind name for the mismatch report).
    Incompatible(&'static str),
}

/// A target the applier can merge a diff into.
///
/// `Default` supplies the fresh nested object used when a nested payload
/// arrives for a field the target does not have yet.
pub trait ApplyTarget: Default {
    /// Invoke a field handler, if one is registered. Returns `true` when the
    /// handler consumed the update.
    fn invoke_handler(&mut self, field: &str, value: &DiffEntry) -> bool;

    /// Detach whatever nested object lives under `field`.
    fn take_nested(&mut self, field: &str) -> FieldSlot<Self>;

    /// Store `nested` back under `field`. Must go through the same write
    /// path as [`assign`](Self::assign) so instrumented targets observe the
    /// reassignment.
    fn put_nested(&mut self, field: &str, nested: Self);

    /// Write a scalar or blob value to `field`.
    fn assign(&mut self, field: &str, value: &DiffEntry);
}

/// Outcome of one apply pass: counts plus the fields that could not be
/// applied.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Fields assigned (scalars, blobs, and nested reassignments).
    pub applied: usize,
    /// Fields consumed by registered handlers.
    pub handled: usize,
    /// Per-field failures; siblings still applied.
    pub skipped: Vec<ReplicationError>,
}

impl ApplyReport {
    /// True when every field applied or was handled.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Walks a diff payload and merges it into an external target.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffApplier;

impl DiffApplier {
    pub fn new() -> Self {
        Self
    }

    /// Merge `diff` into `target`. Never fails as a whole: schema mismatches
    /// are skipped per field and reported.
    pub fn apply<T: ApplyTarget>(&self, diff: &Diff, target: &mut T) -> ApplyReport {
        let mut report = ApplyReport::default();
        self.apply_at(diff, target, "", &mut report);
        debug!(
            applied = report.applied,
            handled = report.handled,
            skipped = report.skipped.len(),
            "Applied diff"
        );
        metrics::record_apply(report.applied, report.handled, report.skipped.len());
        report
    }

    fn apply_at<T: ApplyTarget>(
        &self,
        diff: &Diff,
        target: &mut T,
        prefix: &str,
        report: &mut ApplyReport,
    ) {
        for (field, entry) in diff {
            if target.invoke_handler(field, entry) {
                report.handled += 1;
                continue;
            }
            match entry {
                DiffEntry::Nested(sub) => {
                    let path = join_path(prefix, field);
                    match target.take_nested(field) {
                        FieldSlot::Object(mut nested) => {
                            self.apply_at(sub, &mut nested, &path, report);
                            // Reassign through the target's write path
                            target.put_nested(field, nested);
                            report.applied += 1;
                        }
                        FieldSlot::Missing => {
                            let mut nested = T::default();
                            self.apply_at(sub, &mut nested, &path, report);
                            target.put_nested(field, nested);
                            report.applied += 1;
                        }
                        FieldSlot::Incompatible(actual) => {
                            warn!(
                                path = %path,
                                actual,
                                "Schema mismatch, skipping field"
                            );
                            metrics::record_schema_mismatch();
                            report.skipped.push(ReplicationError::SchemaMismatch {
                                path,
                                actual: actual.to_string(),
                            });
                        }
                    }
                }
                _ => {
                    target.assign(field, entry);
                    report.applied += 1;
                }
            }
        }
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

/// Value stored in a [`MirrorObject`] field.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorValue {
    Scalar(Scalar),
    Blob(serde_json::Value),
    Object(MirrorObject),
}

impl MirrorValue {
    pub fn kind(&self) -> &'static str {
        match self {
            MirrorValue::Scalar(_) => "scalar",
            MirrorValue::Blob(_) => "blob",
            MirrorValue::Object(_) => "object",
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            MirrorValue::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&MirrorObject> {
        match self {
            MirrorValue::Object(object) => Some(object),
            _ => None,
        }
    }
}

/// Per-field event-sink callback on a mirror.
pub type FieldHandler = Rc<dyn Fn(&DiffEntry)>;

/// Write observer: sees every assignment, including nested reassignment.
pub type WriteHook = Rc<dyn Fn(&str, &MirrorValue)>;

/// The stock [`ApplyTarget`]: a plain field map with optional per-field
/// handlers and a write hook.
#[derive(Clone, Default)]
pub struct MirrorObject {
    fields: BTreeMap<String, MirrorValue>,
    handlers: BTreeMap<String, FieldHandler>,
    write_hook: Option<WriteHook>,
}

impl MirrorObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event-sink handler for `field`. Updates for the field are
    /// consumed by the handler instead of being stored.
    pub fn on(&mut self, field: impl Into<String>, handler: impl Fn(&DiffEntry) + 'static) {
        self.handlers.insert(field.into(), Rc::new(handler));
    }

    /// Observe every write (direct assignment and nested reassignment).
    pub fn set_write_hook(&mut self, hook: impl Fn(&str, &MirrorValue) + 'static) {
        self.write_hook = Some(Rc::new(hook));
    }

    /// Pre-populate a field (e.g. to mirror known prior state).
    pub fn set(&mut self, field: impl Into<String>, value: MirrorValue) {
        let field = field.into();
        if let Some(hook) = &self.write_hook {
            hook(&field, &value);
        }
        self.fields.insert(field, value);
    }

    pub fn get(&self, field: &str) -> Option<&MirrorValue> {
        self.fields.get(field)
    }

    /// Follow a dot-separated path through nested objects.
    pub fn lookup(&self, path: &str) -> Option<&MirrorValue> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.fields.get(first)?;
        for part in parts {
            current = current.as_object()?.fields.get(part)?;
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for MirrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorObject")
            .field("fields", &self.fields)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PartialEq for MirrorObject {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl ApplyTarget for MirrorObject {
    fn invoke_handler(&mut self, field: &str, value: &DiffEntry) -> bool {
        if let Some(handler) = self.handlers.get(field) {
            handler(value);
            true
        } else {
            false
        }
    }

    fn take_nested(&mut self, field: &str) -> FieldSlot<Self> {
        match self.fields.remove(field) {
            Some(MirrorValue::Object(object)) => FieldSlot::Object(object),
            Some(other) => {
                // Put the incompatible value back untouched
                let kind = other.kind();
                self.fields.insert(field.to_string(), other);
                FieldSlot::Incompatible(kind)
            }
            None => FieldSlot::Missing,
        }
    }

    fn put_nested(&mut self, field: &str, nested: Self) {
        self.set(field, MirrorValue::Object(nested));
    }

    fn assign(&mut self, field: &str, value: &DiffEntry) {
        let mirrored = match value {
            DiffEntry::Scalar(scalar) => MirrorValue::Scalar(scalar.clone()),
            DiffEntry::Blob(blob) => MirrorValue::Blob(blob.clone()),
            // The applier routes nested entries through take/put_nested
            DiffEntry::Nested(_) => return,
        };
        self.set(field, mirrored);
    }
}
