//! `GrpcTransport`: the abstraction a concrete `tonic`-generated client
//! would implement. The concrete transport is out of scope here, so this
//! crate defines only the contract — call and bidirectional-stream over
//! the canonical envelopes in `envelope.rs` — and never generates or
//! links against a `.proto` file.

use async_trait::async_trait;

use crate::envelope::{FlowRequestEnvelope, FlowResponseEnvelope, StreamResponseEnvelope};
use crate::error::RemoteResult;

/// One established (or establishable) connection to a remote service.
/// A concrete implementation wraps e.g. a `tonic::transport::Channel` and
/// the generated client stub for that service.
#[async_trait]
pub trait GrpcTransport: Send + Sync {
    /// Unary call (`Call(name)`).
    async fn call(&self, request: FlowRequestEnvelope) -> RemoteResult<FlowResponseEnvelope>;

    /// Open a bidirectional stream (`Stream(name)`), split into
    /// independent send/receive halves up front so the caller can drive
    /// them from two separate tasks without sharing a `&mut`.
    async fn open_stream(&self) -> RemoteResult<(Box<dyn StreamSender>, Box<dyn StreamReceiver>)>;
}

/// The send half of an open bidirectional streaming call.
#[async_trait]
pub trait StreamSender: Send + Sync {
    /// Send one chunk-request. `Err` signals the stream is no longer
    /// accepting writes (the stream terminates on either side's close).
    async fn send(&mut self, request: FlowRequestEnvelope) -> RemoteResult<()>;

    /// Signal no further requests will be sent.
    async fn close_send(&mut self);
}

/// The receive half of an open bidirectional streaming call.
#[async_trait]
pub trait StreamReceiver: Send + Sync {
    /// Receive the next response message, or `None` on clean stream end.
    async fn recv(&mut self) -> RemoteResult<Option<StreamResponseEnvelope>>;
}

/// Establishes a `GrpcTransport` for a service's endpoint. A registry
/// entry's "connection" is the lazily-memoized result of calling this
/// once per endpoint.
#[async_trait]
pub trait GrpcConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> RemoteResult<std::sync::Arc<dyn GrpcTransport>>;
}
