//! Byte-stream primitives: a one-direction channel with a producer end
//! (`DataWriter`) and a consumer end (`DataReader`), plus `Buffer`, the
//! fully-materialized variant used by combinators that must tee input to
//! several sub-handlers.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::FlowError;

/// Default channel capacity (in chunks, not bytes) for a pipe allocated by
/// the `Flow` composer between two handlers. Chosen small deliberately so
/// that backpressure is exercised under test, not just in theory.
pub const DEFAULT_PIPE_CAPACITY: usize = 8;

type Item = Result<Bytes, FlowError>;

/// Shared cell a consumer can use to leave a specific reason behind when it
/// closes early, so a producer still writing afterwards observes *that*
/// error instead of a generic broken-pipe failure.
#[derive(Clone, Default)]
struct CloseReason(Arc<Mutex<Option<String>>>);

impl CloseReason {
    fn set(&self, reason: impl Into<String>) {
        *self.0.lock() = Some(reason.into());
    }

    fn take_message(&self) -> Option<String> {
        self.0.lock().clone()
    }
}

/// The producer end of a byte stream (`Response.Data`).
pub struct DataWriter {
    tx: mpsc::Sender<Item>,
    close_reason: CloseReason,
}

/// The consumer end of a byte stream (`Request.Data`).
pub struct DataReader {
    rx: mpsc::Receiver<Item>,
    close_reason: CloseReason,
}

/// Allocate a connected producer/consumer pair with the given channel
/// capacity (number of in-flight chunks before a writer blocks).
pub fn pipe(capacity: usize) -> (DataWriter, DataReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let close_reason = CloseReason::default();
    (
        DataWriter {
            tx,
            close_reason: close_reason.clone(),
        },
        DataReader { rx, close_reason },
    )
}

impl DataWriter {
    /// Write one chunk. Blocks (awaits) while the consumer's buffer is
    /// full — this is the system's intrinsic backpressure.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> Result<(), FlowError> {
        self.tx
            .send(Ok(chunk.into()))
            .await
            .map_err(|_| self.broken_pipe_error())
    }

    pub async fn write_str(&self, s: impl AsRef<str>) -> Result<(), FlowError> {
        self.write(Bytes::copy_from_slice(s.as_ref().as_bytes()))
            .await
    }

    /// Close the stream with an error: the consumer's next `read()`
    /// returns this error instead of end-of-stream.
    pub async fn close_with_error(self, err: FlowError) {
        let _ = self.tx.send(Err(err)).await;
    }

    /// Close the stream normally (consumed by `drop`, since a plain close
    /// is "stop sending", not a special message).
    pub fn close(self) {
        drop(self);
    }

    /// A second producer handle sharing this writer's channel and close
    /// reason. Used internally by the `Flow` composer, which must retain a
    /// handle to every stage's downstream pipe even after the original is
    /// moved into that stage's `Response`, so it can force-close the pipe
    /// with a specific error the moment the stage task fails.
    pub(crate) fn fork(&self) -> DataWriter {
        DataWriter {
            tx: self.tx.clone(),
            close_reason: self.close_reason.clone(),
        }
    }

    fn broken_pipe_error(&self) -> FlowError {
        match self.close_reason.take_message() {
            Some(reason) => FlowError::internal(reason),
            None => FlowError::internal("broken pipe: consumer end dropped"),
        }
    }
}

impl DataReader {
    /// Read the next chunk. `Ok(None)` signals clean end-of-stream
    /// (producer closed without error).
    pub async fn read(&mut self) -> Result<Option<Bytes>, FlowError> {
        match self.rx.recv().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    /// Drain the stream fully into memory. Used by handlers that need the
    /// complete input before producing output.
    pub async fn read_to_buffer(mut self) -> Result<Buffer, FlowError> {
        let mut bytes = Vec::new();
        while let Some(chunk) = self.read().await? {
            bytes.extend_from_slice(&chunk);
        }
        Ok(Buffer::from_bytes(bytes))
    }

    /// Leave a specific close reason behind for a producer that is still
    /// writing when this reader is dropped early.
    pub fn close_with_error(self, reason: impl Into<String>) {
        self.close_reason.set(reason);
    }
}

/// A stream backed by an in-memory byte vector. Supports a deterministic,
/// repeatable read (`reader()`), used by combinators that must broadcast
/// identical input to several sub-handlers.
#[derive(Clone)]
pub struct Buffer {
    bytes: Arc<Vec<u8>>,
}

impl Buffer {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(bytes),
        }
    }

    pub fn from_str(s: impl AsRef<str>) -> Self {
        Self::from_bytes(s.as_ref().as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lossy UTF-8 snapshot, used by `Branch`'s predicate and `Transform`.
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Produce a fresh `DataReader` over the same bytes. Every call yields
    /// an independent, fully-buffered consumer end — a deterministic
    /// re-read of the same contents.
    pub fn reader(&self) -> DataReader {
        let (tx, rx) = mpsc::channel(1);
        let bytes = self.bytes.clone();
        tokio::spawn(async move {
            if !bytes.is_empty() {
                let _ = tx.send(Ok(Bytes::copy_from_slice(&bytes))).await;
            }
        });
        DataReader {
            rx,
            close_reason: CloseReason::default(),
        }
    }

    /// Write this buffer's full contents to a writer, then close normally.
    pub async fn forward_to(&self, writer: &DataWriter) -> Result<(), FlowError> {
        if !self.bytes.is_empty() {
            writer.write(Bytes::copy_from_slice(&self.bytes)).await?;
        }
        Ok(())
    }
}
