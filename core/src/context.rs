//! Per-request `Context`: cancellation, deadline, identifiers, and typed
//! key/value lookups, scoped to one `Flow::run` invocation.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ErrorKind, FlowError};

/// Shared cancellation signal. Cloning a `Context` clones the `Arc`, so
/// cancelling any clone cancels every descendant task.
#[derive(Clone)]
struct Inner {
    trace_id: String,
    request_id: String,
    deadline: Option<Instant>,
    cancel: CancellationToken,
    values: Arc<parking_lot::RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

/// Per-request scope carrying cancellation, an optional deadline, stable
/// trace/request identifiers, and arbitrary key/value lookups.
///
/// Created when a user invokes `Flow::run`; destroyed when the flow
/// returns. Cheap to clone (internally `Arc`-backed); every clone observes
/// the same cancellation signal.
#[derive(Clone)]
pub struct Context {
    inner: Inner,
}

impl Context {
    /// New root context with a freshly generated trace id (one per user
    /// request) and request id (one per pipeline run).
    pub fn new() -> Self {
        Self::with_trace_id(Uuid::new_v4().to_string())
    }

    /// New root context reusing a caller-supplied trace id (e.g. propagated
    /// from an upstream request header).
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            inner: Inner {
                trace_id: trace_id.into(),
                request_id: Uuid::new_v4().to_string(),
                deadline: None,
                cancel: CancellationToken::new(),
                values: Arc::new(parking_lot::RwLock::new(HashMap::new())),
            },
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.inner.trace_id
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    /// Derive a child context with a deadline no later than `now + d`
    /// (and no later than any deadline already in force). Used by
    /// `Timeout`. The child gets its own cancel scope via `child_token()`:
    /// the parent cancelling still cancels the child, but the child
    /// cancelling (e.g. when its deadline fires) does not propagate back up.
    #[must_use]
    pub fn with_deadline(&self, d: Duration) -> Self {
        let candidate = Instant::now() + d;
        let deadline = match self.inner.deadline {
            Some(existing) if existing < candidate => Some(existing),
            _ => Some(candidate),
        };
        let mut inner = self.inner.clone();
        inner.deadline = deadline;
        inner.cancel = self.inner.cancel.child_token();
        Self { inner }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Explicitly cancel this context and every clone descended from it.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
            || self
                .inner
                .deadline
                .is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is cancelled or its deadline passes,
    /// whichever comes first. Handlers should `select!` on this at every
    /// suspension point.
    pub async fn cancelled(&self) {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.inner.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.inner.cancel.cancelled().await,
        }
    }

    /// Returns the error a handler should surface if it observes
    /// cancellation at a suspension point: `DeadlineExceeded` if a deadline
    /// fired, `Cancelled` otherwise.
    pub fn cancellation_error(&self, message: impl Into<String>) -> FlowError {
        let kind = if self.inner.deadline.is_some_and(|d| Instant::now() >= d) {
            ErrorKind::DeadlineExceeded
        } else {
            ErrorKind::Cancelled
        };
        FlowError::new(kind, message).with_ids(
            Some(self.trace_id().to_string()),
            Some(self.request_id().to_string()),
        )
    }

    /// Store a value of type `T`, keyed by `TypeId`. Overwrites any
    /// previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
        self.inner
            .values
            .write()
            .insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Fetch a previously inserted value of type `T`, if any.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .values
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.clone().downcast::<T>().ok())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
