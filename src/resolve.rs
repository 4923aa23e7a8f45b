//! QueryMap resolution: awaits pending descriptor computations.
//!
//! Entries resolve concurrently on one task: resolution of one entry is never
//! delayed by another, and a failed computation is reported through the error
//! handler without aborting sibling entries or sibling list elements.

use futures::future::join_all;

use crate::descriptor::{Descriptor, DescriptorSource, MapEntry};
use crate::error::{report, BindError, ErrorContext, ErrorHandler};

/// A query-map entry with every pending computation settled. `None` marks an
/// element whose computation failed; already reported, skipped at bind time.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedEntry {
    Single(Option<Descriptor>),
    List(Vec<Option<Descriptor>>),
}

/// Resolve one entry, reporting failures under `property`'s context.
pub async fn resolve_entry(
    property: &str,
    entry: MapEntry,
    handler: &ErrorHandler,
) -> ResolvedEntry {
    match entry {
        MapEntry::Single(source) => ResolvedEntry::Single(resolve_source(property, source, handler).await),
        MapEntry::List(sources) => {
            let elements = sources
                .into_iter()
                .map(|source| resolve_source(property, source, handler));
            ResolvedEntry::List(join_all(elements).await)
        }
    }
}

async fn resolve_source(
    property: &str,
    source: DescriptorSource,
    handler: &ErrorHandler,
) -> Option<Descriptor> {
    match source {
        DescriptorSource::Ready(descriptor) => Some(descriptor),
        DescriptorSource::Pending(future) => match future.await {
            Ok(descriptor) => Some(descriptor),
            Err(error) => {
                let wrapped = BindError::Resolution {
                    property: property.to_string(),
                    message: error.to_string(),
                };
                report(handler, &wrapped, Some(&ErrorContext::for_property(property)));
                None
            }
        },
    }
}
