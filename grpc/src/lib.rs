//! `flow-grpc`: the design-level remote (gRPC) handler.
//!
//! Only the service-registry and call/stream handler contracts are
//! implemented here; the concrete wire transport is abstracted behind
//! [`transport::GrpcTransport`] and never generated from a `.proto` file.

pub mod envelope;
pub mod error;
pub mod handler;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use envelope::{FlowRequestEnvelope, FlowResponseEnvelope, StreamResponseEnvelope};
pub use error::{GrpcStatus, RemoteError, RemoteResult};
pub use handler::{Call, Stream};
pub use registry::{InstallRegistry, RetryPolicy, ServiceConfig, ServiceRegistry};
pub use transport::{GrpcConnector, GrpcTransport, StreamReceiver, StreamSender};
