//! Query descriptor model: what remote data a property binds to.
//!
//! Descriptors are a closed, tagged variant decided once at query-map
//! construction; the binder dispatches on the tag, never on runtime
//! capability probing. A [`Descriptor`] is plain data, independent of its
//! resolution state; a [`DescriptorSource`] may defer producing one behind a
//! future.

use std::collections::HashMap;
use std::future::Future;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;

// ============================================================================
// Sort Types
// ============================================================================

/// Sort direction for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A sort specification for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub field: String,
    pub direction: SortDirection,
}

impl SortEntry {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

// ============================================================================
// DocRef
// ============================================================================

/// A direct reference to a single remote document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// The remote path of this reference, used in error context.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

// ============================================================================
// FilterQuery
// ============================================================================

/// A filtered / ordered / limited collection query.
///
/// Filter queries have no stable document identifier, so change detection
/// compares their structural [`fingerprint`](FilterQuery::fingerprint)
/// instead. Structural equality (`PartialEq`) agrees with fingerprint
/// equality.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterQuery {
    pub collection: String,
    /// Top-level field equality filter, e.g. `{ "role": "admin" }`.
    pub filter: Option<Value>,
    pub sort: Option<Vec<SortEntry>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl FilterQuery {
    /// Start a query over every document in `collection`.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
            sort: None,
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Shorthand: sort ascending by a single field.
    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(vec![SortEntry::asc(field)]);
        self
    }

    pub fn sort(mut self, entries: Vec<SortEntry>) -> Self {
        self.sort = Some(entries);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Canonical structural comparison key over collection, filter, sort,
    /// limit, and offset.
    pub fn fingerprint(&self) -> String {
        json!({
            "collection": self.collection,
            "filter": self.filter,
            "sort": self.sort,
            "limit": self.limit,
            "offset": self.offset,
        })
        .to_string()
    }
}

// ============================================================================
// Descriptor
// ============================================================================

/// What remote data to fetch or watch. `Raw` is the explicit escape hatch for
/// values that are not store references at all; they pass straight through
/// into the result cache.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Doc(DocRef),
    Query(FilterQuery),
    Raw(Value),
}

impl Descriptor {
    /// The remote path being queried, when derivable.
    pub fn path(&self) -> Option<String> {
        match self {
            Self::Doc(doc) => Some(doc.path()),
            Self::Query(query) => Some(query.collection.clone()),
            Self::Raw(_) => None,
        }
    }

    /// The resolved document identifier, for direct references only.
    pub fn doc_id(&self) -> Option<&str> {
        match self {
            Self::Doc(doc) => Some(doc.id.as_str()),
            _ => None,
        }
    }
}

impl From<DocRef> for Descriptor {
    fn from(doc: DocRef) -> Self {
        Self::Doc(doc)
    }
}

impl From<FilterQuery> for Descriptor {
    fn from(query: FilterQuery) -> Self {
        Self::Query(query)
    }
}

impl From<Value> for Descriptor {
    fn from(value: Value) -> Self {
        Self::Raw(value)
    }
}

// ============================================================================
// DescriptorSource / MapEntry / QueryMap
// ============================================================================

/// A descriptor supplied directly, or one still being computed.
pub enum DescriptorSource {
    Ready(Descriptor),
    Pending(BoxFuture<'static, Result<Descriptor>>),
}

impl DescriptorSource {
    /// Wrap an asynchronously produced descriptor.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Descriptor>> + Send + 'static,
    {
        Self::Pending(Box::pin(future))
    }
}

impl From<Descriptor> for DescriptorSource {
    fn from(descriptor: Descriptor) -> Self {
        Self::Ready(descriptor)
    }
}

impl From<DocRef> for DescriptorSource {
    fn from(doc: DocRef) -> Self {
        Self::Ready(Descriptor::Doc(doc))
    }
}

impl From<FilterQuery> for DescriptorSource {
    fn from(query: FilterQuery) -> Self {
        Self::Ready(Descriptor::Query(query))
    }
}

impl From<Value> for DescriptorSource {
    fn from(value: Value) -> Self {
        Self::Ready(Descriptor::Raw(value))
    }
}

/// One query-map entry: a single descriptor or a positional list of them.
pub enum MapEntry {
    Single(DescriptorSource),
    List(Vec<DescriptorSource>),
}

/// Build a scalar entry.
pub fn single(source: impl Into<DescriptorSource>) -> MapEntry {
    MapEntry::Single(source.into())
}

/// Build a positional list entry.
pub fn list(sources: impl IntoIterator<Item = DescriptorSource>) -> MapEntry {
    MapEntry::List(sources.into_iter().collect())
}

/// Mapping from property name to descriptor entry, supplied fresh by the
/// consumer on every attach/refresh. Insertion order is irrelevant.
pub type QueryMap = HashMap<String, MapEntry>;

// ============================================================================
// Tests
// ============================================================================
