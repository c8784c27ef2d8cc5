//! Error model for the pipeline runtime.
//!
//! `FlowError` carries a classification (`ErrorKind`), a human message, an
//! optional wrapped cause, and the trace/request identifiers of the
//! `Context` that was active when the error was constructed.

use std::fmt;

/// Coarse classification of a pipeline failure.
///
/// `Retryable` and its siblings are read by `Fallback`/`Retry` to decide
/// whether local recovery is permitted; every other kind is terminal and
/// propagates straight to the `Flow` composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InvalidOutput,
    DeadlineExceeded,
    Cancelled,
    RateLimited,
    Retryable,
    PermissionDenied,
    NotFound,
    InvalidArgument,
    Unauthenticated,
    Internal,
}

impl ErrorKind {
    /// Whether `Fallback`/`Retry` are permitted to recover from an error of
    /// this kind. Only `Retryable` and `RateLimited` are recoverable;
    /// everything else (including `DeadlineExceeded`/`Cancelled`) is
    /// terminal.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Retryable | ErrorKind::RateLimited)
    }
}

/// A structured pipeline error.
///
/// Preserves the cause chain so callers can do identity comparisons on the
/// original error (`source()`), and carries the owning request's trace and
/// request identifiers so that every user-surfaced error string includes
/// them when present.
#[derive(Debug)]
pub struct FlowError {
    kind: ErrorKind,
    message: String,
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    trace_id: Option<String>,
    request_id: Option<String>,
}

impl FlowError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            trace_id: None,
            request_id: None,
        }
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_ids(mut self, trace_id: Option<String>, request_id: Option<String>) -> Self {
        self.trace_id = trace_id;
        self.request_id = request_id;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOutput, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Retryable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// A copy carrying the same kind/message/identifiers but no cause
    /// chain. Used when an error must be forwarded down a second channel
    /// (e.g. into a downstream pipe as well as returned to the caller) and
    /// the boxed cause cannot itself be cloned.
    pub fn duplicate(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            cause: None,
            trace_id: self.trace_id.clone(),
            request_id: self.request_id.clone(),
        }
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(trace_id) = &self.trace_id {
            write!(f, " (trace_id={trace_id}")?;
            if let Some(request_id) = &self.request_id {
                write!(f, ", request_id={request_id}")?;
            }
            write!(f, ")")?;
        } else if let Some(request_id) = &self.request_id {
            write!(f, " (request_id={request_id})")?;
        }
        Ok(())
    }
}

impl std::error::Error for FlowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

pub type FlowResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ErrorKind::Retryable.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::Internal.is_retryable());
        assert!(!ErrorKind::DeadlineExceeded.is_retryable());
    }

    #[test]
    fn display_includes_ids_when_present() {
        let err = FlowError::internal("boom")
            .with_ids(Some("trace-1".into()), Some("req-1".into()));
        let rendered = err.to_string();
        assert!(rendered.contains("trace_id=trace-1"));
        assert!(rendered.contains("request_id=req-1"));
    }

    #[test]
    fn display_omits_ids_when_absent() {
        let err = FlowError::internal("boom");
        assert_eq!(err.to_string(), "Internal: boom");
    }

    #[test]
    fn source_preserves_cause_chain() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = FlowError::internal("wrapped").with_cause(io_err);
        assert!(err.source().is_some());
    }
}
