// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The replication node: change tracking and diff generation.
//!
//! A [`ReplicationNode`] is one node in the replication graph. It owns the
//! [`RecordStore`] for its tracked fields, the version of the last diff it
//! produced, a pending-change latch, and a weak back-reference to the parent
//! node it is attached under.
//!
//! # Hook Surface
//!
//! The surrounding object model (property interception, decorators, whatever
//! the host uses) drives the node through three entry points:
//!
//! - [`record_assignment`](ReplicationNode::record_assignment) on every write
//! - [`get_value`](ReplicationNode::get_value) on read
//! - [`set_parent`](ReplicationNode::set_parent) when attaching under a parent
//!
//! The node never inspects or rewrites the host's field descriptors.
//!
//! # Change Bubbling
//!
//! The first change on a node since its last diff raises the pending-change
//! latch and sends the parent a content-less dirty signal
//! (`record_assignment(field_in_parent, None)`), which marks the parent's
//! record changed and bubbles further. Later changes in the same burst find
//! the latch already raised and stop, so notification cost is O(depth) per
//! dirtying burst, not O(changed fields).
//!
//! # Diff Generation
//!
//! [`gen_diff`](ReplicationNode::gen_diff) walks the record store for a
//! version range `[from, to]`:
//!
//! ```text
//! changed record            → stamp `to`, emit value (recurse for children)
//! stamped_version >= from   → re-send current value (resuming receiver)
//! otherwise                 → omit (receiver already current)
//! ```
//!
//! The re-send branch is what lets a receiver that remembers only the version
//! of its last successful sync converge without a full resync: the generator
//! replays exactly the fields whose last-known version is at or after that
//! point.
//!
//! # Parent Links
//!
//! The parent edge is a weak single-slot reference plus field name, never
//! shared ownership; the host object is the true owner of the node.
//! Re-parenting replaces the link and clears the previous parent's record
//! edge to this child, so a moved child never leaves a stale bubbling path
//! behind. An assignment or link that would create a cycle is refused with a
//! warning before anything is stored, keeping both the value edges (which
//! diff generation follows) and the parent links acyclic.

use crate::diff::{Diff, DiffEntry};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::record::{PropertyRecord, RecordStore};
use crate::registry::LazyRegistry;
use crate::value::{FieldValue, Scalar};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// Weak back-reference to the owning parent, plus the field name this node
/// is attached under there.
struct ParentLink {
    node: Weak<RefCell<NodeInner>>,
    field: String,
}

struct NodeInner {
    records: RecordStore,
    /// Highest version for which a diff has been produced. Monotonic.
    last_version: u64,
    /// True if a change occurred since the parent was last notified.
    pending_change_latch: bool,
    parent: Option<ParentLink>,
    /// Deferred field configuration, consumed by the first diff.
    registry: Option<LazyRegistry>,
    instrumented: bool,
}

impl NodeInner {
    fn new() -> Self {
        Self {
            records: RecordStore::new(),
            last_version: 0,
            pending_change_latch: false,
            parent: None,
            registry: None,
            instrumented: false,
        }
    }

    /// Raise the pending-change latch. On a false→true flip, returns the
    /// parent to notify (if any).
    fn raise_latch(&mut self) -> Option<(ReplicationNode, String)> {
        if self.pending_change_latch {
            return None;
        }
        self.pending_change_latch = true;
        let link = self.parent.as_ref()?;
        let parent = link.node.upgrade()?;
        metrics::record_bubble();
        Some((ReplicationNode { inner: parent }, link.field.clone()))
    }
}

/// One node in the replication graph: the unit of versioned change-tracking.
///
/// Cheap-clone handle over shared interior state; the graph is
/// single-threaded by design (see the crate docs on the concurrency model).
#[derive(Clone)]
pub struct ReplicationNode {
    inner: Rc<RefCell<NodeInner>>,
}

impl ReplicationNode {
    /// Create an untracked node with no fields and version 0.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(NodeInner::new())),
        }
    }

    /// Create a node with a deferred-configuration table attached.
    ///
    /// The registry is consulted exactly once, by the first `gen_diff`.
    pub fn with_registry(registry: LazyRegistry) -> Self {
        let node = Self::new();
        node.set_registry(registry);
        node
    }

    /// Attach a deferred-configuration table.
    ///
    /// Has no effect (beyond a warning) if the node was already instrumented
    /// by an earlier diff.
    pub fn set_registry(&self, registry: LazyRegistry) {
        let mut inner = self.inner.borrow_mut();
        if inner.instrumented {
            warn!("Registry attached after instrumentation, it will never be consulted");
        }
        inner.registry = Some(registry);
    }

    /// Identity comparison of node handles.
    pub fn ptr_eq(&self, other: &ReplicationNode) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // Hook surface
    // =========================================================================

    /// Record that `field` was assigned `value` on the host object.
    ///
    /// `None` is the content-less "something under me changed" signal: it
    /// never replaces a stored value. On a node-valued record it marks the
    /// record changed (so the next diff recurses into the child); on anything
    /// else it is ignored.
    ///
    /// `Some(value)` compares against the stored value and no-ops when equal.
    /// The first observed value for a field creates a clean record; an
    /// initial value is not a change to diff retroactively. A real change
    /// marks the record, raises the latch, and bubbles one dirty signal to
    /// the parent per burst.
    pub fn record_assignment(&self, field: &str, value: Option<FieldValue>) {
        match value {
            None => self.record_dirty_signal(field),
            Some(new_value) => self.record_value_write(field, new_value),
        }
    }

    /// Current stored value for `field`, or `None` if untracked.
    pub fn get_value(&self, field: &str) -> Option<FieldValue> {
        self.inner
            .borrow()
            .records
            .get(field)
            .map(|record| record.value().clone())
    }

    /// Attach this node under `parent` at `field`.
    ///
    /// Replace semantics: the previous parent's record edge to this child is
    /// cleared before the new link installs, so there is exactly one bubbling
    /// path at any instant. A link that would create a cycle is refused with
    /// a warning and the existing link is left untouched.
    pub fn set_parent(&self, parent: &ReplicationNode, field: &str) {
        if self.ptr_eq(parent) || self.is_ancestor_of(parent) {
            warn!(field, "Refusing parent link that would create a cycle");
            return;
        }

        let previous = self.parent();
        if let Some((old_parent, old_field)) = previous {
            if !(old_parent.ptr_eq(parent) && old_field == field) {
                old_parent.detach_child_edge(&old_field, self);
            }
        }

        self.inner.borrow_mut().parent = Some(ParentLink {
            node: Rc::downgrade(&parent.inner),
            field: field.to_string(),
        });
    }

    // =========================================================================
    // Diff generation
    // =========================================================================

    /// Produce the diff payload for the version range `[from_version,
    /// to_version]`, recursing into nested node-valued fields.
    ///
    /// Returns:
    /// - `Err(InvalidRange)` when `to_version < from_version`. No state is
    ///   touched; the caller must not advance its baseline.
    /// - `Ok(None)` when no changes exist in range (untracked node, or
    ///   `from_version` beyond everything this node has produced with no
    ///   pending changes). `last_version` is not advanced.
    /// - `Ok(Some(diff))` otherwise; an empty diff means "in sync, nothing to
    ///   add". `last_version` advances to `to_version` (never backwards) and
    ///   the latch clears.
    pub fn gen_diff(&self, from_version: u64, to_version: u64) -> Result<Option<Diff>> {
        if to_version < from_version {
            warn!(from_version, to_version, "Rejecting inverted version range");
            metrics::record_invalid_range();
            return Err(ReplicationError::InvalidRange {
                from: from_version,
                to: to_version,
            });
        }

        self.install_registrations();

        // Fields to emit. Children are collected as handles and recursed
        // after our borrow drops; cyclic node assignments are refused at
        // write time, so the recursion terminates.
        enum Planned {
            Value(DiffEntry),
            Child(ReplicationNode),
        }
        let mut planned: Vec<(String, Planned)> = Vec::new();

        {
            let mut inner = self.inner.borrow_mut();
            if inner.records.is_empty()
                || (from_version > inner.last_version && !inner.pending_change_latch)
            {
                trace!(
                    from_version,
                    to_version,
                    last_version = inner.last_version,
                    "No changes in range"
                );
                metrics::record_no_change_diff();
                return Ok(None);
            }

            for (name, record) in inner.records.iter_mut() {
                let include = if record.is_changed() {
                    record.stamp(to_version);
                    true
                } else {
                    // Re-send: the receiver's snapshot may predate this
                    // field's last update even though nothing changed this
                    // cycle.
                    record.stamped_version() >= from_version
                };
                if !include {
                    continue;
                }
                let plan = match record.value() {
                    FieldValue::Node(child) => Planned::Child(child.clone()),
                    FieldValue::Scalar(scalar) => {
                        Planned::Value(DiffEntry::Scalar(scalar.clone()))
                    }
                    FieldValue::Blob(blob) => Planned::Value(DiffEntry::Blob(blob.clone())),
                };
                planned.push((name.clone(), plan));
            }

            // Monotonic: a caller handing out an older target version can
            // still drain changes, but never winds the node backwards.
            inner.last_version = inner.last_version.max(to_version);
            inner.pending_change_latch = false;
        }

        let mut out = Diff::new();
        for (name, plan) in planned {
            match plan {
                Planned::Value(entry) => out.insert(name, entry),
                Planned::Child(child) => {
                    // A no-changes child is omitted, never serialized.
                    if let Some(sub) = child.gen_diff(from_version, to_version)? {
                        out.insert(name, DiffEntry::Nested(sub));
                    }
                }
            }
        }

        debug!(
            from_version,
            to_version,
            fields = out.len(),
            "Generated diff"
        );
        metrics::record_diff_generated(out.len());
        Ok(Some(out))
    }

    // =========================================================================
    // Introspection and passthrough
    // =========================================================================

    /// Highest version for which a diff has been produced.
    pub fn last_version(&self) -> u64 {
        self.inner.borrow().last_version
    }

    /// True if a change occurred since the last diff cycle.
    pub fn has_pending_changes(&self) -> bool {
        self.inner.borrow().pending_change_latch
    }

    /// Whether `field` has a tracking record.
    pub fn is_tracked(&self, field: &str) -> bool {
        self.inner.borrow().records.contains(field)
    }

    /// Number of tracked fields.
    pub fn tracked_field_count(&self) -> usize {
        self.inner.borrow().records.len()
    }

    /// The parent node and attachment field, if linked.
    pub fn parent(&self) -> Option<(ReplicationNode, String)> {
        let inner = self.inner.borrow();
        let link = inner.parent.as_ref()?;
        let parent = link.node.upgrade()?;
        Some((ReplicationNode { inner: parent }, link.field.clone()))
    }

    /// Opaque per-recipient filter tag declared for `field`, for the
    /// transport layer. No semantics inside this core.
    pub fn field_filter(&self, field: &str) -> Option<i64> {
        self.inner
            .borrow()
            .records
            .get(field)
            .and_then(|record| record.config())
            .and_then(|config| config.filter_condition)
    }

    /// Alternate write target declared for `field`, for interception layers.
    pub fn alternate_write_target(&self, field: &str) -> Option<String> {
        self.inner
            .borrow()
            .records
            .get(field)
            .and_then(|record| record.config())
            .and_then(|config| config.alternate_write_target.clone())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Content-less dirty signal: a descendant of the node stored at `field`
    /// changed. Never replaces the stored value.
    fn record_dirty_signal(&self, field: &str) {
        let bubble = {
            let mut inner = self.inner.borrow_mut();
            match inner.records.get_mut(field) {
                Some(record) if record.holds_node() => record.mark_changed(),
                _ => {
                    // Undefined means "no delta", not "clear the field".
                    trace!(field, "Dirty signal for non-node field ignored");
                    return;
                }
            }
            inner.raise_latch()
        };
        self.notify(bubble);
    }

    fn record_value_write(&self, field: &str, new_value: FieldValue) {
        // A node assignment that would close a cycle is refused outright,
        // before anything is stored: diff generation follows value edges, so
        // a cyclic edge must never exist, not merely lack a parent link.
        if let FieldValue::Node(child) = &new_value {
            if child.ptr_eq(self) || child.is_ancestor_of(self) {
                warn!(field, "Refusing node assignment that would create a cycle");
                return;
            }
        }

        // Phase 1, under our borrow: compare and store. User hooks and other
        // nodes are only touched after the borrow drops.
        enum Outcome {
            Created,
            Changed { old: FieldValue },
        }
        let outcome = {
            let mut inner = self.inner.borrow_mut();
            match inner.records.get_mut(field) {
                Some(record) => {
                    if record.value().same_as(&new_value) {
                        trace!(field, "No-op write suppressed");
                        return;
                    }
                    let old = record.value().clone();
                    record.set_value(new_value.clone());
                    Outcome::Changed { old }
                }
                None => {
                    // First observed value: track it clean. The receiver gets
                    // it through its own from-zero full sync.
                    inner
                        .records
                        .insert(field, PropertyRecord::initial(new_value.clone()));
                    Outcome::Created
                }
            }
        };

        // Parent-link maintenance for node values, outside the borrow.
        if let Outcome::Changed {
            old: FieldValue::Node(old_child),
        } = &outcome
        {
            old_child.clear_parent_if(self, field);
        }
        if let FieldValue::Node(child) = &new_value {
            child.set_parent(self, field);
        }

        if matches!(outcome, Outcome::Created) {
            return;
        }

        // Change hook may veto tracking for this write.
        let hook = {
            let inner = self.inner.borrow();
            inner
                .records
                .get(field)
                .and_then(|record| record.config())
                .and_then(|config| config.on_change.clone())
        };
        if let Some(hook) = hook {
            if !hook(field, &new_value) {
                debug!(field, "Change hook vetoed tracking for this write");
                return;
            }
        }

        let bubble = {
            let mut inner = self.inner.borrow_mut();
            if let Some(record) = inner.records.get_mut(field) {
                record.mark_changed();
            }
            metrics::record_field_change();
            inner.raise_latch()
        };
        self.notify(bubble);
    }

    /// Send the bubbled dirty signal, if the latch flipped.
    fn notify(&self, bubble: Option<(ReplicationNode, String)>) {
        if let Some((parent, field)) = bubble {
            trace!(field, "Bubbling change to parent");
            parent.record_assignment(&field, None);
        }
    }

    /// One-shot lazy instrumentation: drain the registry into live records.
    fn install_registrations(&self) {
        let registry = {
            let mut inner = self.inner.borrow_mut();
            if inner.instrumented {
                return;
            }
            inner.instrumented = true;
            if inner.last_version != 0 {
                return;
            }
            match inner.registry.take() {
                Some(registry) if !registry.is_empty() => registry,
                _ => return,
            }
        };

        // Cycle checks walk parent chains, so they run before the borrow.
        // A registration that would close a cycle is dropped whole.
        let entries: Vec<_> = registry
            .drain()
            .filter(|(field, registration)| {
                if let FieldValue::Node(child) = &registration.initial {
                    if child.ptr_eq(self) || child.is_ancestor_of(self) {
                        warn!(field = %field, "Skipping registration that would create a cycle");
                        return false;
                    }
                }
                true
            })
            .collect();

        let mut installed = 0usize;
        let mut child_links: Vec<(ReplicationNode, String)> = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            for (field, registration) in entries {
                if let Some(record) = inner.records.get_mut(&field) {
                    // The host wrote before the first diff: the observed
                    // value wins, the registration contributes config only.
                    record.set_config(registration.config);
                    continue;
                }
                if let FieldValue::Node(child) = &registration.initial {
                    child_links.push((child.clone(), field.clone()));
                }
                let mut record = PropertyRecord::initial(registration.initial);
                record.set_config(registration.config);
                inner.records.insert(field, record);
                installed += 1;
            }
        }

        debug!(installed, "Installed deferred field registrations");
        metrics::record_lazy_install(installed);
        for (child, field) in child_links {
            child.set_parent(self, &field);
        }
    }

    /// Clear this node's parent link if it currently points at exactly
    /// (`parent`, `field`).
    fn clear_parent_if(&self, parent: &ReplicationNode, field: &str) {
        let mut inner = self.inner.borrow_mut();
        let matches = inner
            .parent
            .as_ref()
            .map(|link| {
                link.field == field
                    && link
                        .node
                        .upgrade()
                        .is_some_and(|node| Rc::ptr_eq(&node, &parent.inner))
            })
            .unwrap_or(false);
        if matches {
            inner.parent = None;
        }
    }

    /// Clear the record edge under `field` if it still holds `child`.
    /// Leaves the changed flag untouched: the move itself is bookkeeping,
    /// not a data change to replicate.
    fn detach_child_edge(&self, field: &str, child: &ReplicationNode) {
        let mut inner = self.inner.borrow_mut();
        if let Some(record) = inner.records.get_mut(field) {
            let holds_child = record
                .value()
                .as_node()
                .is_some_and(|node| node.ptr_eq(child));
            if holds_child {
                debug!(field, "Clearing stale edge to re-parented child");
                record.set_value(FieldValue::Scalar(Scalar::Null));
            }
        }
    }

    /// Whether `self` appears in `other`'s ancestor chain.
    fn is_ancestor_of(&self, other: &ReplicationNode) -> bool {
        let mut current = other.parent().map(|(node, _)| node);
        while let Some(node) = current {
            if node.ptr_eq(self) {
                return true;
            }
            current = node.parent().map(|(next, _)| next);
        }
        false
    }
}

impl Default for ReplicationNode {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReplicationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ReplicationNode")
            .field("tracked_fields", &inner.records.len())
            .field("last_version", &inner.last_version)
            .field("pending_change_latch", &inner.pending_change_latch)
            .field("has_parent", &inner.parent.is_some())
            .finish()
    }
}
