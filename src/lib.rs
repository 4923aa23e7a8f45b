//! livebind: reactive query binding for remote document stores.
//!
//! A [`Binder`] connects a declarative map of remote queries to a consuming
//! view: it resolves the map, opens live listeners or one-shot fetches per
//! entry, normalizes snapshots into a uniform result cache, and delivers the
//! merged `props ∪ results` to the consumer on every change.
//!
//! ```no_run
//! use std::sync::Arc;
//! use livebind::{single, Binder, DocRef, MemoryStore, Props, QueryMap};
//!
//! # async fn demo() {
//! let store = Arc::new(MemoryStore::new());
//! let binder = Binder::new(store, |_store, props, _identity| {
//!     let friend_id = props["friendId"].as_str().unwrap_or_default().to_string();
//!     QueryMap::from([("friend".to_string(), single(DocRef::new("users", friend_id)))])
//! });
//! binder.attach(Props::new()).await;
//! # }
//! ```

pub mod binder;
pub mod descriptor;
pub mod detect;
pub mod error;
pub mod normalize;
pub mod output;
pub mod registry;
pub mod resolve;
pub mod store;

pub use binder::{BindMode, Binder, BinderOptions, Props, QueryMapFn};
pub use descriptor::{
    list, single, Descriptor, DescriptorSource, DocRef, FilterQuery, MapEntry, QueryMap,
    SortDirection, SortEntry,
};
pub use error::{BindError, ErrorContext, ErrorHandler, Result, StoreError};
pub use normalize::{normalize_doc, normalize_query};
pub use registry::{SlotKey, SubscriptionRegistry};
pub use resolve::ResolvedEntry;
pub use store::{
    DocSnapshot, MemoryStore, QuerySnapshot, RemoteStore, Unsubscribe,
};
