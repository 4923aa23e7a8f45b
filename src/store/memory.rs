//! In-memory reference implementation of [`RemoteStore`].
//!
//! Documents live in per-collection `BTreeMap`s so iteration order is
//! deterministic (ascending by id). Mutations notify matching listeners
//! synchronously; the listener table is snapshotted and the lock released
//! before any callback fires, so callbacks may re-enter the store freely.
//!
//! Query invalidation is conservative: any write to a collection re-runs
//! every query listener registered on it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::descriptor::{DocRef, FilterQuery, SortDirection, SortEntry};
use crate::error::StoreError;

use super::{
    DocCallback, DocSnapshot, ListenErrorCallback, QueryCallback, QuerySnapshot, RemoteStore,
    Unsubscribe,
};

// ============================================================================
// Internal state
// ============================================================================

struct DocListener {
    id: u64,
    callback: DocCallback,
}

struct QueryListener {
    id: u64,
    query: FilterQuery,
    callback: QueryCallback,
}

struct StoreState {
    /// Documents keyed by collection, then by id (deterministic order).
    collections: HashMap<String, BTreeMap<String, Value>>,
    /// Document listeners keyed by `"collection/id"`.
    doc_listeners: HashMap<String, Vec<DocListener>>,
    query_listeners: Vec<QueryListener>,
    identity: Option<String>,
    next_id: u64,
}

impl StoreState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn doc_snapshot(&self, collection: &str, id: &str) -> DocSnapshot {
        let data = self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned();
        DocSnapshot {
            id: id.to_string(),
            data,
        }
    }

    fn query_snapshot(&self, query: &FilterQuery) -> QuerySnapshot {
        let mut docs: Vec<DocSnapshot> = self
            .collections
            .get(&query.collection)
            .map(|coll| {
                coll.iter()
                    .filter(|(_, data)| matches_filter(data, query.filter.as_ref()))
                    .map(|(id, data)| DocSnapshot {
                        id: id.clone(),
                        data: Some(data.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(entries) = &query.sort {
            docs.sort_by(|a, b| compare_docs(a, b, entries));
        }
        if let Some(offset) = query.offset {
            docs.drain(..offset.min(docs.len()));
        }
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        QuerySnapshot { docs }
    }
}

// ============================================================================
// Filter / sort helpers
// ============================================================================

/// Top-level field equality match.
fn matches_filter(data: &Value, filter: Option<&Value>) -> bool {
    let Some(Value::Object(fields)) = filter else {
        return true;
    };
    fields
        .iter()
        .all(|(key, expected)| data.get(key) == Some(expected))
}

fn compare_docs(a: &DocSnapshot, b: &DocSnapshot, entries: &[SortEntry]) -> Ordering {
    for entry in entries {
        let av = a.data.as_ref().and_then(|d| d.get(&entry.field));
        let bv = b.data.as_ref().and_then(|d| d.get(&entry.field));
        let ord = compare_values(av, bv);
        let ord = match entry.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    // Stable fallback keeps iteration order deterministic.
    a.id.cmp(&b.id)
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory [`RemoteStore`] backend.
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                collections: HashMap::new(),
                doc_listeners: HashMap::new(),
                query_listeners: Vec::new(),
                identity: None,
                next_id: 1,
            })),
        }
    }

    /// Insert or replace a document and notify matching listeners.
    pub fn put(&self, collection: &str, id: &str, data: Value) {
        let notifications = {
            let mut st = self.state.lock();
            st.collections
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), data);
            collect_notifications(&st, collection, id)
        };
        fire(notifications);
    }

    /// Remove a document and notify matching listeners. A no-op when absent.
    pub fn delete(&self, collection: &str, id: &str) {
        let notifications = {
            let mut st = self.state.lock();
            let removed = st
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.remove(id))
                .is_some();
            if !removed {
                return;
            }
            collect_notifications(&st, collection, id)
        };
        fire(notifications);
    }

    /// Seed a collection without firing listeners (test setup).
    pub fn seed<I, S>(&self, collection: &str, docs: I)
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let mut st = self.state.lock();
        let coll = st.collections.entry(collection.to_string()).or_default();
        for (id, data) in docs {
            coll.insert(id.into(), data);
        }
    }

    pub fn set_identity(&self, identity: Option<String>) {
        self.state.lock().identity = identity;
    }

    /// Number of currently installed live listeners (doc + query).
    pub fn listener_count(&self) -> usize {
        let st = self.state.lock();
        let docs: usize = st.doc_listeners.values().map(Vec::len).sum();
        docs + st.query_listeners.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending callback invocations, collected under the lock and fired after it
/// is released.
type Notifications = Vec<Box<dyn FnOnce() + Send>>;

fn collect_notifications(st: &StoreState, collection: &str, id: &str) -> Notifications {
    let mut pending: Notifications = Vec::new();

    let key = format!("{collection}/{id}");
    if let Some(listeners) = st.doc_listeners.get(&key) {
        for listener in listeners {
            let callback = Arc::clone(&listener.callback);
            let snapshot = st.doc_snapshot(collection, id);
            pending.push(Box::new(move || callback(snapshot)));
        }
    }

    for listener in &st.query_listeners {
        if listener.query.collection != collection {
            continue;
        }
        let callback = Arc::clone(&listener.callback);
        let snapshot = st.query_snapshot(&listener.query);
        pending.push(Box::new(move || callback(snapshot)));
    }

    pending
}

fn fire(notifications: Notifications) {
    for notify in notifications {
        notify();
    }
}

// ============================================================================
// RemoteStore impl
// ============================================================================

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn fetch_doc(&self, doc: &DocRef) -> Result<DocSnapshot, StoreError> {
        let st = self.state.lock();
        Ok(st.doc_snapshot(&doc.collection, &doc.id))
    }

    async fn fetch_query(&self, query: &FilterQuery) -> Result<QuerySnapshot, StoreError> {
        let st = self.state.lock();
        Ok(st.query_snapshot(query))
    }

    fn listen_doc(
        &self,
        doc: &DocRef,
        on_snapshot: DocCallback,
        _on_error: ListenErrorCallback,
    ) -> Unsubscribe {
        let key = doc.path();
        let (listener_id, initial) = {
            let mut st = self.state.lock();
            let listener_id = st.next_id();
            st.doc_listeners
                .entry(key.clone())
                .or_default()
                .push(DocListener {
                    id: listener_id,
                    callback: Arc::clone(&on_snapshot),
                });
            (listener_id, st.doc_snapshot(&doc.collection, &doc.id))
        };
        // Initial snapshot fires outside the lock, after registration.
        on_snapshot(initial);

        let state = Arc::clone(&self.state);
        Box::new(move || {
            let mut st = state.lock();
            if let Some(listeners) = st.doc_listeners.get_mut(&key) {
                listeners.retain(|l| l.id != listener_id);
                if listeners.is_empty() {
                    st.doc_listeners.remove(&key);
                }
            }
        })
    }

    fn listen_query(
        &self,
        query: &FilterQuery,
        on_snapshot: QueryCallback,
        _on_error: ListenErrorCallback,
    ) -> Unsubscribe {
        let (listener_id, initial) = {
            let mut st = self.state.lock();
            let listener_id = st.next_id();
            st.query_listeners.push(QueryListener {
                id: listener_id,
                query: query.clone(),
                callback: Arc::clone(&on_snapshot),
            });
            (listener_id, st.query_snapshot(query))
        };
        on_snapshot(initial);

        let state = Arc::clone(&self.state);
        Box::new(move || {
            let mut st = state.lock();
            st.query_listeners.retain(|l| l.id != listener_id);
        })
    }

    async fn current_identity(&self) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().identity.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
