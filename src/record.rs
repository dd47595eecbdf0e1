// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-node table of tracked fields and their change state.
//!
//! Each tracked field owns a [`PropertyRecord`]: the current value, a
//! `changed` flag covering mutations since the last diff, and the version at
//! which the record was last included in a generated diff (its *stamped*
//! version). Records are created on first assignment (or by lazy
//! instrumentation) and persist for the node's lifetime.
//!
//! Invariant: a record's stamped version never exceeds the owning node's
//! `last_version`: stamping happens only inside diff generation, which ends
//! by advancing `last_version` to the same target.

use crate::registry::FieldConfig;
use crate::value::FieldValue;
use std::collections::BTreeMap;

/// Change state for one tracked field.
#[derive(Debug, Clone)]
pub struct PropertyRecord {
    value: FieldValue,
    changed: bool,
    stamped_version: u64,
    config: Option<FieldConfig>,
}

impl PropertyRecord {
    /// Record for a first observed value.
    ///
    /// Starts clean: an initial value is not a change to diff retroactively;
    /// the receiver gets it through its own from-zero full sync.
    pub fn initial(value: FieldValue) -> Self {
        Self {
            value,
            changed: false,
            stamped_version: 0,
            config: None,
        }
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Replace the stored value. Does not touch the changed flag.
    pub fn set_value(&mut self, value: FieldValue) {
        self.value = value;
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Cover this record in a diff: clear the changed flag and stamp the
    /// target version.
    pub fn stamp(&mut self, version: u64) {
        self.changed = false;
        self.stamped_version = version;
    }

    pub fn stamped_version(&self) -> u64 {
        self.stamped_version
    }

    pub fn holds_node(&self) -> bool {
        matches!(self.value, FieldValue::Node(_))
    }

    pub fn config(&self) -> Option<&FieldConfig> {
        self.config.as_ref()
    }

    pub fn set_config(&mut self, config: FieldConfig) {
        self.config = Some(config);
    }
}

/// Field name → [`PropertyRecord`] table for one node.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: BTreeMap<String, PropertyRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&PropertyRecord> {
        self.records.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut PropertyRecord> {
        self.records.get_mut(field)
    }

    /// Install a record for a field. Replaces any existing record.
    pub fn insert(&mut self, field: impl Into<String>, record: PropertyRecord) {
        self.records.insert(field.into(), record);
    }

    pub fn contains(&self, field: &str) -> bool {
        self.records.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in deterministic field order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyRecord)> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut PropertyRecord)> {
        self.records.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;

    #[test]
    fn test_initial_record_starts_clean() {
        let record = PropertyRecord::initial(FieldValue::from(1i64));
        assert!(!record.is_changed());
        assert_eq!(record.stamped_version(), 0);
        assert!(record.config().is_none());
    }

    #[test]
    fn test_mark_and_stamp() {
        let mut record = PropertyRecord::initial(FieldValue::from(1i64));
        record.mark_changed();
        assert!(record.is_changed());

        record.stamp(7);
        assert!(!record.is_changed());
        assert_eq!(record.stamped_version(), 7);
    }

    #[test]
    fn test_set_value_keeps_changed_flag() {
        let mut record = PropertyRecord::initial(FieldValue::from(1i64));
        record.set_value(FieldValue::from(2i64));
        assert!(!record.is_changed());
        assert!(record.value().same_as(&FieldValue::from(2i64)));
    }

    #[test]
    fn test_holds_node() {
        let scalar = PropertyRecord::initial(FieldValue::Scalar(Scalar::Int(1)));
        assert!(!scalar.holds_node());

        let node = PropertyRecord::initial(FieldValue::Node(crate::node::ReplicationNode::new()));
        assert!(node.holds_node());
    }

    #[test]
    fn test_store_insert_and_lookup() {
        let mut store = RecordStore::new();
        assert!(store.is_empty());

        store.insert("hp", PropertyRecord::initial(FieldValue::from(100i64)));
        assert_eq!(store.len(), 1);
        assert!(store.contains("hp"));
        assert!(!store.contains("mp"));
        assert!(store.get("hp").is_some());
        assert!(store.get("mp").is_none());
    }

    #[test]
    fn test_store_deterministic_order() {
        let mut store = RecordStore::new();
        store.insert("b", PropertyRecord::initial(FieldValue::from(2i64)));
        store.insert("a", PropertyRecord::initial(FieldValue::from(1i64)));
        store.insert("c", PropertyRecord::initial(FieldValue::from(3i64)));

        let names: Vec<_> = store.iter().map(|(name, _)| name.clone()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
