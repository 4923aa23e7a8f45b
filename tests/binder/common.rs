//! Shared fixtures: instrumented stores and handler/prop helpers.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use livebind::store::{DocCallback, ListenErrorCallback, QueryCallback};
use livebind::{
    DocRef, DocSnapshot, ErrorHandler, FilterQuery, MemoryStore, Props, QuerySnapshot,
    RemoteStore, StoreError, Unsubscribe,
};

// ============================================================================
// CountingStore: wraps MemoryStore, counts installs and disposals
// ============================================================================

pub struct CountingStore {
    pub inner: MemoryStore,
    installs: AtomicUsize,
    disposals: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            installs: AtomicUsize::new(0),
            disposals: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    fn wrap(&self, handle: Unsubscribe) -> Unsubscribe {
        self.installs.fetch_add(1, Ordering::SeqCst);
        let disposals = Arc::clone(&self.disposals);
        Box::new(move || {
            disposals.fetch_add(1, Ordering::SeqCst);
            handle();
        })
    }
}

#[async_trait]
impl RemoteStore for CountingStore {
    async fn fetch_doc(&self, doc: &DocRef) -> Result<DocSnapshot, StoreError> {
        self.inner.fetch_doc(doc).await
    }

    async fn fetch_query(&self, query: &FilterQuery) -> Result<QuerySnapshot, StoreError> {
        self.inner.fetch_query(query).await
    }

    fn listen_doc(
        &self,
        doc: &DocRef,
        on_snapshot: DocCallback,
        on_error: ListenErrorCallback,
    ) -> Unsubscribe {
        let handle = self.inner.listen_doc(doc, on_snapshot, on_error);
        self.wrap(handle)
    }

    fn listen_query(
        &self,
        query: &FilterQuery,
        on_snapshot: QueryCallback,
        on_error: ListenErrorCallback,
    ) -> Unsubscribe {
        let handle = self.inner.listen_query(query, on_snapshot, on_error);
        self.wrap(handle)
    }

    async fn current_identity(&self) -> Result<Option<String>, StoreError> {
        self.inner.current_identity().await
    }
}

// ============================================================================
// LeakyStore: disposers are no-ops, so listeners keep firing after disposal.
// Exercises the binder's own write guards.
// ============================================================================

pub struct LeakyStore {
    pub inner: MemoryStore,
}

impl LeakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
        }
    }
}

#[async_trait]
impl RemoteStore for LeakyStore {
    async fn fetch_doc(&self, doc: &DocRef) -> Result<DocSnapshot, StoreError> {
        self.inner.fetch_doc(doc).await
    }

    async fn fetch_query(&self, query: &FilterQuery) -> Result<QuerySnapshot, StoreError> {
        self.inner.fetch_query(query).await
    }

    fn listen_doc(
        &self,
        doc: &DocRef,
        on_snapshot: DocCallback,
        on_error: ListenErrorCallback,
    ) -> Unsubscribe {
        let _leaked = self.inner.listen_doc(doc, on_snapshot, on_error);
        Box::new(|| {})
    }

    fn listen_query(
        &self,
        query: &FilterQuery,
        on_snapshot: QueryCallback,
        on_error: ListenErrorCallback,
    ) -> Unsubscribe {
        let _leaked = self.inner.listen_query(query, on_snapshot, on_error);
        Box::new(|| {})
    }

    async fn current_identity(&self) -> Result<Option<String>, StoreError> {
        self.inner.current_identity().await
    }
}

// ============================================================================
// IdentityErrorStore: identity lookups always fail
// ============================================================================

pub struct IdentityErrorStore {
    pub inner: MemoryStore,
}

impl IdentityErrorStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
        }
    }
}

#[async_trait]
impl RemoteStore for IdentityErrorStore {
    async fn fetch_doc(&self, doc: &DocRef) -> Result<DocSnapshot, StoreError> {
        self.inner.fetch_doc(doc).await
    }

    async fn fetch_query(&self, query: &FilterQuery) -> Result<QuerySnapshot, StoreError> {
        self.inner.fetch_query(query).await
    }

    fn listen_doc(
        &self,
        doc: &DocRef,
        on_snapshot: DocCallback,
        on_error: ListenErrorCallback,
    ) -> Unsubscribe {
        self.inner.listen_doc(doc, on_snapshot, on_error)
    }

    fn listen_query(
        &self,
        query: &FilterQuery,
        on_snapshot: QueryCallback,
        on_error: ListenErrorCallback,
    ) -> Unsubscribe {
        self.inner.listen_query(query, on_snapshot, on_error)
    }

    async fn current_identity(&self) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("auth backend offline".to_string()))
    }
}

// ============================================================================
// ListenErrorStore: every live listener immediately reports a backend error
// ============================================================================

pub struct ListenErrorStore {
    pub inner: MemoryStore,
}

impl ListenErrorStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
        }
    }
}

#[async_trait]
impl RemoteStore for ListenErrorStore {
    async fn fetch_doc(&self, doc: &DocRef) -> Result<DocSnapshot, StoreError> {
        self.inner.fetch_doc(doc).await
    }

    async fn fetch_query(&self, query: &FilterQuery) -> Result<QuerySnapshot, StoreError> {
        self.inner.fetch_query(query).await
    }

    fn listen_doc(
        &self,
        doc: &DocRef,
        on_snapshot: DocCallback,
        on_error: ListenErrorCallback,
    ) -> Unsubscribe {
        let handle = self.inner.listen_doc(doc, on_snapshot, on_error.clone());
        on_error(StoreError::Unavailable("stream closed".to_string()));
        handle
    }

    fn listen_query(
        &self,
        query: &FilterQuery,
        on_snapshot: QueryCallback,
        on_error: ListenErrorCallback,
    ) -> Unsubscribe {
        let handle = self.inner.listen_query(query, on_snapshot, on_error.clone());
        on_error(StoreError::Unavailable("stream closed".to_string()));
        handle
    }

    async fn current_identity(&self) -> Result<Option<String>, StoreError> {
        self.inner.current_identity().await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Build `Props` from a JSON object literal.
pub fn props(value: Value) -> Props {
    value.as_object().cloned().unwrap_or_default()
}

/// An error handler that collects messages for assertions.
pub fn collecting_errors() -> (Arc<ErrorHandler>, Arc<Mutex<Vec<String>>>) {
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let log_clone = Arc::clone(&log);
    let handler: Arc<ErrorHandler> = Arc::new(move |error, context| {
        let entry = match context {
            Some(ctx) => format!("{error} [{ctx}]"),
            None => error.to_string(),
        };
        log_clone.lock().push(entry);
    });
    (handler, log)
}
