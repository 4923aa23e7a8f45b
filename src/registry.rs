//! Subscription registry: at most one live listener per slot.
//!
//! The registry stores disposers but never runs them: every method that
//! removes entries hands the disposers back to the caller, which runs them
//! outside whatever lock guards the registry.

use std::collections::HashMap;

use crate::store::Unsubscribe;

/// The addressable unit of subscription state: a property name, optionally
/// paired with a positional index for list-shaped entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub property: String,
    pub index: Option<usize>,
}

impl SlotKey {
    pub fn scalar(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            index: None,
        }
    }

    pub fn indexed(property: impl Into<String>, index: usize) -> Self {
        Self {
            property: property.into(),
            index: Some(index),
        }
    }
}

/// Table of active subscription handles, keyed by slot.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<SlotKey, Unsubscribe>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` under `slot`. Any handle already present is displaced
    /// and returned so the caller can dispose it; this enforces the
    /// at-most-one-listener-per-slot invariant.
    pub fn install(&mut self, slot: SlotKey, handle: Unsubscribe) -> Option<Unsubscribe> {
        self.entries.insert(slot, handle)
    }

    /// Remove the entry at `slot`, returning its disposer. Absent slots are a
    /// no-op (`None`), so disposal is idempotent from the caller's view.
    pub fn remove(&mut self, slot: &SlotKey) -> Option<Unsubscribe> {
        self.entries.remove(slot)
    }

    /// Remove every entry (scalar and positional) for `property`.
    pub fn drain_property(&mut self, property: &str) -> Vec<Unsubscribe> {
        let keys: Vec<SlotKey> = self
            .entries
            .keys()
            .filter(|k| k.property == property)
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k))
            .collect()
    }

    /// Remove every entry unconditionally.
    pub fn drain_all(&mut self) -> Vec<Unsubscribe> {
        self.entries.drain().map(|(_, handle)| handle).collect()
    }

    pub fn contains(&self, slot: &SlotKey) -> bool {
        self.entries.contains_key(slot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
