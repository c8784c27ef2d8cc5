//! The `Handler` contract: `Request`/`Response` envelopes and the
//! single-operation capability every pipeline stage implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::FlowResult;
use crate::stream::{Buffer, DataReader, DataWriter};

/// What a handler reads from: the per-request `Context` plus the consumer
/// end of the upstream byte stream.
pub struct Request {
    pub context: Context,
    pub data: DataReader,
}

impl Request {
    pub fn new(context: Context, data: DataReader) -> Self {
        Self { context, data }
    }

    /// Drain `Request.Data` fully and return it as a `Buffer`. Handlers
    /// that need the complete input before producing output call this
    /// instead of reading incrementally.
    pub async fn read_to_buffer(self) -> FlowResult<Buffer> {
        self.data.read_to_buffer().await
    }
}

/// What a handler writes to: the producer end of the downstream byte
/// stream. `Response.Data` writes are visible to the next handler's
/// `Request.Data`.
pub struct Response {
    pub data: DataWriter,
}

impl Response {
    pub fn new(data: DataWriter) -> Self {
        Self { data }
    }
}

/// The handler contract: a single operation that consumes a `Request` and
/// produces a `Response`, returning an error on failure.
///
/// Implementors must:
/// - respect `Request.context` cancellation at every suspension point;
/// - write only to `Response.data`, never back to the `Request`;
/// - not retain the `Request`/`Response` after returning;
/// - drain `Request.data` first if they need the complete input.
///
/// Handlers are stateless with respect to the pipeline runtime; any
/// internal mutable state is the handler's own responsibility to
/// synchronize.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()>;

    /// A short name used in tracing spans and `FlowMetrics` callbacks.
    /// Defaults to the Rust type name; combinators override this to
    /// describe their composed shape (e.g. `"Chain(3)"`).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        (**self).serve_flow(request, response).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A boxed, type-erased handler — the shape `Flow::use_handler` stores its
/// stages as, and the shape every combinator accepts for its sub-handlers.
pub type BoxHandler = Arc<dyn Handler>;

/// Lift a closure into a `Handler` without buffering: the closure is given
/// the raw `Request`/`Response` and is responsible for streaming. Used
/// internally by combinators that need an ad-hoc stage (e.g. a sink that
/// feeds an `OutputConverter`).
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request, Response) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = FlowResult<()>> + Send,
{
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        (self.f)(request, response).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
