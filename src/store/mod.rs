//! Remote store interface: the external collaborator the binder talks to.
//!
//! A [`RemoteStore`] must be able to perform one-shot fetches, install live
//! listeners that yield a disposer and repeated snapshot notifications, and
//! report the caller's identity. Timeout and retry semantics are owned
//! entirely by the store; the binder imposes none.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::descriptor::{DocRef, FilterQuery};
use crate::error::StoreError;

pub use memory::MemoryStore;

// ============================================================================
// Snapshots
// ============================================================================

/// A point-in-time payload for a single document. `data` is `None` when the
/// backing document does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct DocSnapshot {
    pub id: String,
    pub data: Option<Value>,
}

impl DocSnapshot {
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }
}

/// A point-in-time payload for a collection query, in the store's iteration
/// order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySnapshot {
    pub docs: Vec<DocSnapshot>,
}

// ============================================================================
// Callback types
// ============================================================================

/// An owned one-shot closure that removes a live listener when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// Snapshot notification callback for document listeners.
pub type DocCallback = Arc<dyn Fn(DocSnapshot) + Send + Sync>;

/// Snapshot notification callback for query listeners.
pub type QueryCallback = Arc<dyn Fn(QuerySnapshot) + Send + Sync>;

/// Error callback for live listeners.
pub type ListenErrorCallback = Arc<dyn Fn(StoreError) + Send + Sync>;

// ============================================================================
// RemoteStore
// ============================================================================

/// The capabilities the binder requires of a remote document store.
///
/// Live listeners fire the current snapshot once on installation and again on
/// every subsequent change, until the returned [`Unsubscribe`] runs.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// One-shot fetch of a single document.
    async fn fetch_doc(&self, doc: &DocRef) -> Result<DocSnapshot, StoreError>;

    /// One-shot execution of a collection query.
    async fn fetch_query(&self, query: &FilterQuery) -> Result<QuerySnapshot, StoreError>;

    /// Install a live listener on a single document.
    fn listen_doc(
        &self,
        doc: &DocRef,
        on_snapshot: DocCallback,
        on_error: ListenErrorCallback,
    ) -> Unsubscribe;

    /// Install a live listener on a collection query.
    fn listen_query(
        &self,
        query: &FilterQuery,
        on_snapshot: QueryCallback,
        on_error: ListenErrorCallback,
    ) -> Unsubscribe;

    /// The identity of the current caller, `None` when anonymous.
    async fn current_identity(&self) -> Result<Option<String>, StoreError>;
}
