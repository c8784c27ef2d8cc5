//! `flow-core`: the streaming handler pipeline runtime.
//!
//! Byte-stream primitives, the request/response envelope, the `Handler`
//! contract, the flow composer, the converter protocol, and the
//! concurrency/control combinators (`Chain`, `Parallel`, `Fallback`,
//! `Timeout`, `RateLimit`, `Branch`, `Retry`, `Transform`).

pub mod combinators;
pub mod context;
pub mod converter;
pub mod error;
pub mod flow;
pub mod handler;
pub mod metrics;
pub mod stream;

pub use combinators::{Branch, Chain, Fallback, Parallel, RateLimit, Retry, Timeout, Transform};
pub use context::Context;
pub use converter::{BytesInput, BytesOutput, InputConverter, OutputConverter, StringInput, StringOutput};
pub use error::{ErrorKind, FlowError, FlowResult};
pub use flow::Flow;
pub use handler::{BoxHandler, FnHandler, Handler, Request, Response};
pub use metrics::{FlowMetrics, NoopMetrics, StageOutcome};
pub use stream::{pipe, Buffer, DataReader, DataWriter, DEFAULT_PIPE_CAPACITY};
