//! In-memory `GrpcTransport`/`GrpcConnector` test doubles. Not part of
//! the public API; used only by `#[cfg(test)]` modules elsewhere in this
//! crate.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::envelope::{FlowRequestEnvelope, FlowResponseEnvelope, StreamResponseEnvelope};
use crate::error::{GrpcStatus, RemoteError, RemoteResult};
use crate::transport::{GrpcConnector, GrpcTransport, StreamReceiver, StreamSender};

/// Echoes `input` back as `"echo:{input}"`, for both unary calls and
/// streamed chunks. Used by tests that only care about wiring, not
/// business logic.
///
/// The streaming half is backed by an `mpsc` channel rather than a
/// peekable queue: `StreamReceiver::recv` blocks until either a message
/// arrives or the sender closes, so there is no window where the
/// receiver can observe "empty" before a message that is already in
/// flight actually lands (a `Mutex<VecDeque>` with a `pop_front`/`is_some`
/// check would race exactly there).
#[derive(Default)]
pub struct EchoTransport;

#[async_trait]
impl GrpcTransport for EchoTransport {
    async fn call(&self, request: FlowRequestEnvelope) -> RemoteResult<FlowResponseEnvelope> {
        Ok(FlowResponseEnvelope::ok(format!("echo:{}", request.input)))
    }

    async fn open_stream(&self) -> RemoteResult<(Box<dyn StreamSender>, Box<dyn StreamReceiver>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        Ok((Box::new(EchoSender { tx }), Box::new(EchoReceiver { rx })))
    }
}

struct EchoSender {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl StreamSender for EchoSender {
    async fn send(&mut self, request: FlowRequestEnvelope) -> RemoteResult<()> {
        self.tx
            .send(request.input)
            .map_err(|_| RemoteError::status("echo", GrpcStatus::Unavailable, "receiver gone"))
    }

    async fn close_send(&mut self) {
        // Dropping the sender half would require `self` by value; instead
        // replace it with a closed channel so the paired receiver's next
        // `recv()` observes end-of-stream.
        let (closed_tx, _) = mpsc::unbounded_channel();
        self.tx = closed_tx;
    }
}

struct EchoReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl StreamReceiver for EchoReceiver {
    async fn recv(&mut self) -> RemoteResult<Option<StreamResponseEnvelope>> {
        match self.rx.recv().await {
            Some(input) => Ok(Some(StreamResponseEnvelope {
                output: format!("echo:{input}"),
                success: true,
                error_message: String::new(),
                metadata: Default::default(),
                is_final: false,
            })),
            None => Ok(None),
        }
    }
}

/// Connector that always hands back the same `EchoTransport`, counting
/// how many times `connect` was actually invoked so tests can assert a
/// registry memoizes its connection.
#[derive(Default)]
pub struct EchoConnector {
    connect_calls: AtomicU32,
}

impl EchoConnector {
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GrpcConnector for EchoConnector {
    async fn connect(&self, _endpoint: &str) -> RemoteResult<Arc<dyn GrpcTransport>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(EchoTransport))
    }
}

/// Transport whose `call` fails with a retryable status the first
/// `fail_times` invocations, then echoes successfully. Used to exercise
/// `Call`'s retry loop.
pub struct FlakyTransport {
    remaining_failures: AtomicU32,
}

#[async_trait]
impl GrpcTransport for FlakyTransport {
    async fn call(&self, request: FlowRequestEnvelope) -> RemoteResult<FlowResponseEnvelope> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(RemoteError::status(
                "flaky",
                GrpcStatus::Unavailable,
                "backend warming up",
            ));
        }
        Ok(FlowResponseEnvelope::ok(format!("echo:{}", request.input)))
    }

    async fn open_stream(&self) -> RemoteResult<(Box<dyn StreamSender>, Box<dyn StreamReceiver>)> {
        EchoTransport.open_stream().await
    }
}

/// Connector handing back a single shared `FlakyTransport` that fails
/// `fail_times` times before succeeding.
pub struct FlakyConnector {
    fail_times: u32,
}

impl FlakyConnector {
    pub fn new(fail_times: u32) -> Self {
        Self { fail_times }
    }
}

#[async_trait]
impl GrpcConnector for FlakyConnector {
    async fn connect(&self, _endpoint: &str) -> RemoteResult<Arc<dyn GrpcTransport>> {
        Ok(Arc::new(FlakyTransport {
            remaining_failures: AtomicU32::new(self.fail_times),
        }))
    }
}
