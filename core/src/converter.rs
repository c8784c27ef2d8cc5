//! Converter protocol: adapters between user values and byte streams at
//! the pipeline boundary.

use async_trait::async_trait;

use crate::error::{FlowError, FlowResult};
use crate::stream::DataReader;

/// Produces a readable byte stream from a user value. May fail with
/// `InvalidInput`.
#[async_trait]
pub trait InputConverter<I>: Send + Sync {
    async fn convert(&self, input: I) -> FlowResult<DataReader>;
}

/// Consumes the final byte stream into a user destination value. May fail
/// with `InvalidOutput`.
#[async_trait]
pub trait OutputConverter<O>: Send + Sync {
    async fn convert(&self, data: DataReader) -> FlowResult<O>;
}

/// `InputConverter` for a plain UTF-8 `String`: writes the whole string as
/// a single chunk. The most common entry point for `Transform`-style
/// pipelines.
pub struct StringInput;

#[async_trait]
impl InputConverter<String> for StringInput {
    async fn convert(&self, input: String) -> FlowResult<DataReader> {
        let buffer = crate::stream::Buffer::from_str(&input);
        Ok(buffer.reader())
    }
}

/// `InputConverter` for raw bytes.
pub struct BytesInput;

#[async_trait]
impl InputConverter<Vec<u8>> for BytesInput {
    async fn convert(&self, input: Vec<u8>) -> FlowResult<DataReader> {
        Ok(crate::stream::Buffer::from_bytes(input).reader())
    }
}

/// `OutputConverter` that drains the stream and decodes it as UTF-8,
/// failing with `InvalidOutput` on invalid bytes rather than lossily
/// substituting (unlike `Buffer::as_str_lossy`, which combinators use
/// internally for predicates).
pub struct StringOutput;

#[async_trait]
impl OutputConverter<String> for StringOutput {
    async fn convert(&self, data: DataReader) -> FlowResult<String> {
        let buffer = data.read_to_buffer().await?;
        String::from_utf8(buffer.as_bytes().to_vec())
            .map_err(|e| FlowError::invalid_output(format!("output is not valid UTF-8: {e}")))
    }
}

/// `OutputConverter` that drains the stream into raw bytes, making no
/// assumptions about encoding.
pub struct BytesOutput;

#[async_trait]
impl OutputConverter<Vec<u8>> for BytesOutput {
    async fn convert(&self, data: DataReader) -> FlowResult<Vec<u8>> {
        let buffer = data.read_to_buffer().await?;
        Ok(buffer.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn string_input_then_output_roundtrip() {
        let reader = StringInput.convert("hello".to_string()).await.unwrap();
        let out = StringOutput.convert(reader).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn bytes_roundtrip() {
        let reader = BytesInput.convert(vec![1, 2, 3]).await.unwrap();
        let out = BytesOutput.convert(reader).await.unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn string_output_rejects_invalid_utf8() {
        let reader = BytesInput.convert(vec![0xff, 0xfe]).await.unwrap();
        let err = StringOutput.convert(reader).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidOutput);
    }
}
