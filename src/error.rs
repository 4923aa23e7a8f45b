//! Error taxonomy and the pluggable error handler.
//!
//! No error may escape the binder into the consumer as a panic or unhandled
//! failure: every asynchronous chain terminates in the [`ErrorHandler`], and
//! errors never roll back already-committed results from sibling properties.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failures raised by a [`RemoteStore`](crate::store::RemoteStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

// ---------------------------------------------------------------------------
// BindError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Descriptor resolution failed for \"{property}\": {message}")]
    Resolution { property: String, message: String },

    #[error("Identity lookup failed: {0}")]
    Identity(String),

    #[error("Binder is already attached")]
    AlreadyAttached,

    #[error("Binder is detached")]
    Detached,
}

/// Convenience alias; the default error type is `BindError`.
pub type Result<T, E = BindError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// ErrorContext / ErrorHandler
// ---------------------------------------------------------------------------

/// Where an error happened: the query-map property and, when derivable, the
/// remote path being queried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub property: Option<String>,
    pub path: Option<String>,
}

impl ErrorContext {
    pub fn for_property(property: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.property, &self.path) {
            (Some(p), Some(path)) => write!(f, "property \"{p}\" ({path})"),
            (Some(p), None) => write!(f, "property \"{p}\""),
            (None, Some(path)) => write!(f, "{path}"),
            (None, None) => write!(f, "<no context>"),
        }
    }
}

/// Consumer-supplied error sink. The handler receiving an error never aborts
/// the binder; panics inside it are caught and discarded.
pub type ErrorHandler = dyn Fn(&BindError, Option<&ErrorContext>) + Send + Sync;

/// The default handler: structured logging, nothing else.
pub fn default_error_handler() -> Arc<ErrorHandler> {
    Arc::new(|error, context| match context {
        Some(ctx) => tracing::error!(%error, %ctx, "livebind error"),
        None => tracing::error!(%error, "livebind error"),
    })
}

/// Invoke `handler` with panic isolation.
pub(crate) fn report(handler: &ErrorHandler, error: &BindError, context: Option<&ErrorContext>) {
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        handler(error, context);
    }));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
