//! Change detection: decides whether a refresh must tear down and replace a
//! slot's subscription or leave it alone.
//!
//! Filter queries have no stable identifier, so they compare by structural
//! fingerprint and never reconnect for mere object-identity changes. Direct
//! references compare by resolved identifier and always refresh when the
//! previous identifier is unknown.

use crate::descriptor::Descriptor;
use crate::resolve::ResolvedEntry;

/// What the binder should do with one property's slots on refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotPlan {
    /// Existing subscription and cached result stay untouched.
    Unchanged,
    /// Dispose every slot for the property and rebind from scratch.
    Replace,
    /// Positional update of a list entry: dispose only superseded positions,
    /// bind the listed ones. `rebuild` carries the new length when the cached
    /// array must be cleared dense before results arrive.
    Positions {
        dispose: Vec<usize>,
        bind: Vec<usize>,
        rebuild: Option<usize>,
    },
}

/// Compare the last fully committed entry with the next resolved entry.
pub fn diff_entry(previous: Option<&ResolvedEntry>, next: &ResolvedEntry) -> SlotPlan {
    let Some(previous) = previous else {
        // First run always resubscribes.
        return SlotPlan::Replace;
    };

    match (previous, next) {
        (ResolvedEntry::Single(prev), ResolvedEntry::Single(next)) => {
            diff_single(prev.as_ref(), next.as_ref())
        }
        (ResolvedEntry::List(prev), ResolvedEntry::List(next)) => diff_list(prev, next),
        // Shape change between scalar and list.
        _ => SlotPlan::Replace,
    }
}

fn diff_single(prev: Option<&Descriptor>, next: Option<&Descriptor>) -> SlotPlan {
    let Some(next) = next else {
        // The next descriptor failed to resolve and was already reported;
        // keep the working subscription rather than tearing down good data.
        return SlotPlan::Unchanged;
    };
    let Some(prev) = prev else {
        // Previous identifier unknown: always refresh.
        return SlotPlan::Replace;
    };

    let changed = match (prev, next) {
        (Descriptor::Doc(p), Descriptor::Doc(n)) => p != n,
        // Fingerprint comparison: identical structure never resubscribes,
        // regardless of object identity.
        (Descriptor::Query(p), Descriptor::Query(n)) => p != n,
        (Descriptor::Raw(p), Descriptor::Raw(n)) => p != n,
        _ => true,
    };
    if changed {
        SlotPlan::Replace
    } else {
        SlotPlan::Unchanged
    }
}

fn diff_list(prev: &[Option<Descriptor>], next: &[Option<Descriptor>]) -> SlotPlan {
    let mut dispose = Vec::new();
    let mut bind = Vec::new();

    for (index, next_descriptor) in next.iter().enumerate() {
        let position_changed = match prev.get(index) {
            Some(prev_descriptor) => {
                matches!(
                    diff_single(prev_descriptor.as_ref(), next_descriptor.as_ref()),
                    SlotPlan::Replace
                )
            }
            None => true,
        };
        if position_changed {
            if index < prev.len() {
                dispose.push(index);
            }
            if next_descriptor.is_some() {
                bind.push(index);
            }
        }
    }

    // Truncated tail positions lose their subscriptions.
    for index in next.len()..prev.len() {
        dispose.push(index);
    }

    let rebuild = (prev.len() != next.len()).then_some(next.len());

    if dispose.is_empty() && bind.is_empty() && rebuild.is_none() {
        SlotPlan::Unchanged
    } else {
        SlotPlan::Positions {
            dispose,
            bind,
            rebuild,
        }
    }
}
