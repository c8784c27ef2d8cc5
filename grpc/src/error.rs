//! Error model for the design-level remote (gRPC) handler. `RemoteError`
//! is the crate-local error; it is always convertible
//! into `flow_core::FlowError` so `Call`/`Stream` can surface it through
//! the ordinary pipeline error channel.

use thiserror::Error;

use flow_core::{ErrorKind, FlowError};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Canonical gRPC status classes relevant to this design. Retries apply
/// to statuses classified retryable: Unavailable, DeadlineExceeded,
/// ResourceExhausted, Internal, Aborted. Others are terminal. Kept as a
/// small closed enum rather than the full gRPC status space, since only
/// these distinctions drive retry/propagation behavior here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrpcStatus {
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Internal,
    Aborted,
    PermissionDenied,
    NotFound,
    InvalidArgument,
    Unauthenticated,
}

impl GrpcStatus {
    /// The retryable set.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            GrpcStatus::Unavailable
                | GrpcStatus::DeadlineExceeded
                | GrpcStatus::ResourceExhausted
                | GrpcStatus::Internal
                | GrpcStatus::Aborted
        )
    }

    fn error_kind(self) -> ErrorKind {
        match self {
            GrpcStatus::Unavailable => ErrorKind::Retryable,
            GrpcStatus::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            GrpcStatus::ResourceExhausted => ErrorKind::Retryable,
            GrpcStatus::Internal => ErrorKind::Retryable,
            GrpcStatus::Aborted => ErrorKind::Retryable,
            GrpcStatus::PermissionDenied => ErrorKind::PermissionDenied,
            GrpcStatus::NotFound => ErrorKind::NotFound,
            GrpcStatus::InvalidArgument => ErrorKind::InvalidArgument,
            GrpcStatus::Unauthenticated => ErrorKind::Unauthenticated,
        }
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no service registered under name '{0}'")]
    UnknownService(String),

    #[error("failed to establish connection to '{endpoint}': {message}")]
    ConnectFailed { endpoint: String, message: String },

    #[error("remote call to '{service}' failed with status {status:?}: {message}")]
    Status {
        service: String,
        status: GrpcStatus,
        message: String,
    },

    #[error("remote call to '{service}' exceeded its per-service timeout")]
    Timeout { service: String },

    #[error("pipeline error: {0}")]
    Flow(#[from] FlowError),
}

impl RemoteError {
    pub fn status(service: impl Into<String>, status: GrpcStatus, message: impl Into<String>) -> Self {
        RemoteError::Status {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// Whether `Call`'s retry loop is permitted to re-invoke the
    /// transport for this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Status { status, .. } => status.is_retryable(),
            RemoteError::Timeout { .. } => true,
            RemoteError::Flow(e) => e.is_retryable(),
            RemoteError::UnknownService(_) | RemoteError::ConnectFailed { .. } => false,
        }
    }
}

impl From<RemoteError> for FlowError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Flow(e) => e,
            RemoteError::UnknownService(name) => {
                FlowError::new(ErrorKind::NotFound, format!("unknown service '{name}'"))
            }
            RemoteError::ConnectFailed { endpoint, message } => FlowError::new(
                ErrorKind::Retryable,
                format!("connect to '{endpoint}' failed: {message}"),
            ),
            RemoteError::Status {
                service,
                status,
                message,
            } => FlowError::new(status.error_kind(), format!("{service}: {message}")),
            RemoteError::Timeout { service } => FlowError::new(
                ErrorKind::DeadlineExceeded,
                format!("call to '{service}' timed out"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_match_spec_set() {
        assert!(GrpcStatus::Unavailable.is_retryable());
        assert!(GrpcStatus::DeadlineExceeded.is_retryable());
        assert!(GrpcStatus::ResourceExhausted.is_retryable());
        assert!(GrpcStatus::Internal.is_retryable());
        assert!(GrpcStatus::Aborted.is_retryable());
        assert!(!GrpcStatus::PermissionDenied.is_retryable());
        assert!(!GrpcStatus::NotFound.is_retryable());
        assert!(!GrpcStatus::InvalidArgument.is_retryable());
        assert!(!GrpcStatus::Unauthenticated.is_retryable());
    }

    #[test]
    fn status_error_converts_to_matching_flow_error_kind() {
        let err: FlowError =
            RemoteError::status("trtllm", GrpcStatus::NotFound, "missing").into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
