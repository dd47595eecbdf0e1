// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deferred per-field configuration, consulted once per node.
//!
//! Fields are declared before the owning node is ever diffed; the
//! [`LazyRegistry`] remembers the declared configuration and initial value so
//! the cost of instrumentation is deferred until replication is actually
//! requested. The first `gen_diff` on a node drains its registry, installs a
//! record for every registered field, and never consults the table again:
//! a one-shot `uninstrumented -> instrumented` transition.
//!
//! A field the host already wrote before the first diff keeps its observed
//! value; the registration only contributes the configuration.
//!
//! # Field Configuration
//!
//! [`FieldConfig`] carries:
//! - `alternate_write_target`: passthrough for interception layers that
//!   redirect writes to a different slot on the host.
//! - `filter_condition`: an opaque integer the transport layer may use for
//!   per-recipient filtering. No semantics inside this core.
//! - `on_change`: a change-notify hook invoked after each accepted write;
//!   returning `false` suppresses tracking for that write (the field was
//!   handled out of band).

use crate::error::{ReplicationError, Result};
use crate::value::FieldValue;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::warn;

/// Change-notify hook: `(field, new_value) -> keep_tracking`.
///
/// The host captures whatever context it needs (e.g. itself) in the closure.
pub type ChangeHook = Rc<dyn Fn(&str, &FieldValue) -> bool>;

/// Declaration-time configuration for one tracked field.
#[derive(Clone, Default)]
pub struct FieldConfig {
    /// Redirect slot for interception layers. Passthrough only.
    pub alternate_write_target: Option<String>,
    /// Opaque per-recipient filter tag for the transport layer.
    pub filter_condition: Option<i64>,
    /// Invoked after each accepted write; `false` return suppresses tracking.
    pub on_change: Option<ChangeHook>,
}

impl FieldConfig {
    /// Empty configuration (track the field, nothing else).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the alternate write target.
    pub fn with_alternate_write_target(mut self, target: impl Into<String>) -> Self {
        self.alternate_write_target = Some(target.into());
        self
    }

    /// Set the opaque filter condition.
    pub fn with_filter_condition(mut self, condition: i64) -> Self {
        self.filter_condition = Some(condition);
        self
    }

    /// Set the change-notify hook.
    pub fn with_on_change(mut self, hook: impl Fn(&str, &FieldValue) -> bool + 'static) -> Self {
        self.on_change = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for FieldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldConfig")
            .field("alternate_write_target", &self.alternate_write_target)
            .field("filter_condition", &self.filter_condition)
            .field("on_change", &self.on_change.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

/// One deferred registration: configuration plus the field's initial value.
#[derive(Debug, Clone)]
pub struct FieldRegistration {
    pub config: FieldConfig,
    pub initial: FieldValue,
}

/// Deferred-configuration table keyed by field name.
///
/// Populated at declaration time, drained exactly once by the first diff on
/// the owning node.
#[derive(Debug, Default)]
pub struct LazyRegistry {
    fields: BTreeMap<String, FieldRegistration>,
}

impl LazyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one field with full configuration.
    ///
    /// A repeated registration for the same field replaces the earlier one
    /// (last declaration wins, logged at warn level).
    pub fn register(
        &mut self,
        field: impl Into<String>,
        initial: impl Into<FieldValue>,
        config: FieldConfig,
    ) -> Result<()> {
        let field = field.into();
        if field.is_empty() {
            return Err(ReplicationError::Registry(
                "field name must not be empty".to_string(),
            ));
        }
        let registration = FieldRegistration {
            config,
            initial: initial.into(),
        };
        if self.fields.insert(field.clone(), registration).is_some() {
            warn!(field = %field, "Duplicate field registration, last declaration wins");
        }
        Ok(())
    }

    /// Register one field with default configuration.
    pub fn register_field(
        &mut self,
        field: impl Into<String>,
        initial: impl Into<FieldValue>,
    ) -> Result<()> {
        self.register(field, initial, FieldConfig::new())
    }

    /// Register an entire object's fields en masse, default configuration.
    pub fn register_object<I, K, V>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        for (field, initial) in fields {
            self.register_field(field, initial)?;
        }
        Ok(())
    }

    /// Number of pending registrations.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Drain all registrations, in deterministic field order.
    ///
    /// Called by the owning node during one-shot instrumentation.
    pub(crate) fn drain(self) -> impl Iterator<Item = (String, FieldRegistration)> {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_register_and_drain() {
        let mut registry = LazyRegistry::new();
        registry.register_field("hp", 100i64).unwrap();
        registry
            .register("owner", "alice", FieldConfig::new().with_filter_condition(7))
            .unwrap();
        assert_eq!(registry.len(), 2);

        let entries: Vec<_> = registry.drain().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "hp");
        assert_eq!(entries[1].0, "owner");
        assert_eq!(entries[1].1.config.filter_condition, Some(7));
    }

    #[test]
    fn test_empty_field_name_rejected() {
        let mut registry = LazyRegistry::new();
        let err = registry.register_field("", 1i64).unwrap_err();
        assert!(matches!(err, ReplicationError::Registry(_)));
    }

    #[test]
    fn test_duplicate_registration_last_wins() {
        let mut registry = LazyRegistry::new();
        registry.register_field("hp", 100i64).unwrap();
        registry.register_field("hp", 50i64).unwrap();
        assert_eq!(registry.len(), 1);

        let (_, registration) = registry.drain().next().unwrap();
        assert!(registration.initial.same_as(&FieldValue::from(50i64)));
    }

    #[test]
    fn test_register_object_en_masse() {
        let mut registry = LazyRegistry::new();
        registry
            .register_object([("x", 1i64), ("y", 2i64), ("z", 3i64)])
            .unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_config_builder() {
        let config = FieldConfig::new()
            .with_alternate_write_target("_shadow")
            .with_filter_condition(42);
        assert_eq!(config.alternate_write_target.as_deref(), Some("_shadow"));
        assert_eq!(config.filter_condition, Some(42));
        assert!(config.on_change.is_none());
    }

    #[test]
    fn test_on_change_hook_callable() {
        let fired = Rc::new(Cell::new(false));
        let fired_clone = Rc::clone(&fired);
        let config = FieldConfig::new().with_on_change(move |field, _value| {
            assert_eq!(field, "hp");
            fired_clone.set(true);
            true
        });
        let hook = config.on_change.as_ref().unwrap();
        assert!(hook("hp", &FieldValue::from(1i64)));
        assert!(fired.get());
    }
}
