//! Consumer delivery: emits the merged `props ∪ results` map after every
//! committed result-cache mutation.
//!
//! The listener list is snapshotted and the lock released before any callback
//! fires, so callbacks may subscribe or unsubscribe during emission without
//! deadlocking. A listener removed mid-emission still receives that round; a
//! listener added mid-emission does not.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::store::Unsubscribe;

/// Callback receiving the merged update payload.
pub type UpdateCallback = dyn Fn(&Map<String, Value>) + Send + Sync;

/// Synchronous fan-out of merged updates to consumers.
#[derive(Default)]
pub struct UpdateEmitter {
    listeners: Mutex<Vec<(u64, Arc<UpdateCallback>)>>,
    next_id: AtomicU64,
}

impl UpdateEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`, returning a disposer that removes it. The
    /// disposer is safe to call after the emitter's owner is gone.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&Map<String, Value>) + Send + Sync + 'static,
    ) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(callback)));

        let emitter = Arc::clone(self);
        Box::new(move || {
            emitter.listeners.lock().retain(|(lid, _)| *lid != id);
        })
    }

    /// Deliver `merged` to every currently registered listener. Panicking
    /// listeners are isolated and cannot abort the caller.
    pub fn emit(&self, merged: &Map<String, Value>) {
        let snapshot: Vec<Arc<UpdateCallback>> = {
            let guard = self.listeners.lock();
            guard.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in snapshot {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(merged);
            }));
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}
