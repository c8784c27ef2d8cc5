//! The AI agent wrapper: classifies input, drives a `ProviderClient`
//! turn, and applies the hybrid text/tool-call streaming buffering rule.

use std::sync::Arc;

use async_trait::async_trait;
use flow_core::{Handler, Request, Response};
use tokio::sync::mpsc;
use tracing::debug;

use crate::classify::{classify, InputKind};
use crate::client::{AgentOptions, ChatChunk, ChatSink, ProviderClient};
use crate::envelope::{MultimodalPart, ToolCall, ToolCallEnvelope};
use crate::error::AgentResult;

/// Wraps a `ProviderClient` into a pipeline `Handler`. One `Agent`
/// instance represents one fixed set of options (tools, response schema,
/// attachments, usage callback); build a new instance per distinct
/// configuration the way `Transform` is built per function.
pub struct Agent {
    client: Arc<dyn ProviderClient>,
    options: AgentOptions,
    name: String,
}

impl Agent {
    pub fn new(client: Arc<dyn ProviderClient>, options: AgentOptions) -> Self {
        Self {
            client,
            options,
            name: "Agent".to_string(),
        }
    }

    pub fn named(name: impl Into<String>, client: Arc<dyn ProviderClient>, options: AgentOptions) -> Self {
        Self {
            client,
            options,
            name: name.into(),
        }
    }

    /// Turn a classified input into the flat prompt string handed to the
    /// provider. Multimodal envelopes are passed through as their JSON
    /// wire form; the concrete provider adapter (out of scope here) is
    /// responsible for re-encoding parts into that provider's own
    /// multimodal request shape.
    fn prompt_for(&self, kind: &InputKind) -> AgentResult<String> {
        match kind {
            InputKind::Text(text) => Ok(text.clone()),
            InputKind::MultimodalJson(envelope) => Ok(serde_json::to_string(envelope)
                .map_err(|e| crate::error::AgentError::InvalidEnvelope(e.to_string()))?),
            InputKind::MultimodalStreaming(envelope) => {
                let table = self.options.attachments.as_ref().ok_or_else(|| {
                    crate::error::AgentError::InvalidEnvelope(
                        "envelope references attachments but no attachment table was supplied"
                            .to_string(),
                    )
                })?;
                for part in &envelope.parts {
                    let binary = match part {
                        MultimodalPart::Text { .. } => continue,
                        MultimodalPart::Image(b) | MultimodalPart::Audio(b) | MultimodalPart::Video(b) => b,
                    };
                    if let Some(id) = &binary.attachment_ref {
                        table.get(id)?;
                    }
                }
                Ok(serde_json::to_string(envelope)
                    .map_err(|e| crate::error::AgentError::InvalidEnvelope(e.to_string()))?)
            }
        }
    }
}

#[async_trait]
impl Handler for Agent {
    async fn serve_flow(&self, request: Request, response: Response) -> flow_core::FlowResult<()> {
        let buffer = request.read_to_buffer().await?;
        let kind = classify(&buffer);
        let prompt = self.prompt_for(&kind).map_err(flow_core::FlowError::from)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn ChatSink> = Arc::new(ChannelSink { tx });

        let chat_fut = self.client.chat(&prompt, &self.options, sink);
        let drain_fut = drain_into_response(rx, &response, self.options.usage_callback.as_deref());

        let (chat_result, drain_result) = tokio::join!(chat_fut, drain_fut);
        chat_result.map_err(flow_core::FlowError::from)?;
        drain_result?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<ChatChunk>,
}

#[async_trait]
impl ChatSink for ChannelSink {
    async fn push(&self, chunk: ChatChunk) {
        let _ = self.tx.send(chunk);
    }
}

/// State machine implementing the hybrid buffering rule. `suppress_text`
/// latches permanently once any function-call
/// chunk has been observed: tool-call emissions must never be followed by
/// further text for that turn, even once text has already started
/// streaming.
struct HybridBuffer {
    streaming: bool,
    suppress_text: bool,
    calls: Vec<ToolCall>,
}

impl HybridBuffer {
    fn new() -> Self {
        Self {
            streaming: false,
            suppress_text: false,
            calls: Vec::new(),
        }
    }

    /// Returns text that should be written to the response immediately,
    /// if any.
    fn ingest(&mut self, chunk: ChatChunk) -> Option<String> {
        if !chunk.function_calls.is_empty() {
            self.calls.extend(chunk.function_calls);
            self.suppress_text = true;
            return None;
        }
        let Some(text) = chunk.text else {
            return None;
        };
        if self.suppress_text {
            return None;
        }
        if self.streaming {
            return Some(text);
        }
        self.streaming = true;
        Some(text)
    }

    fn has_calls(&self) -> bool {
        !self.calls.is_empty()
    }
}

async fn drain_into_response(
    mut rx: mpsc::UnboundedReceiver<ChatChunk>,
    response: &Response,
    usage_callback: Option<&(dyn Fn(&crate::usage::UsageMetadata) + Send + Sync)>,
) -> flow_core::FlowResult<()> {
    let mut buffer = HybridBuffer::new();
    let mut usage = None;
    while let Some(chunk) = rx.recv().await {
        if let Some(u) = &chunk.usage {
            usage = Some(u.clone());
        }
        if let Some(text) = buffer.ingest(chunk) {
            response.data.write_str(text).await?;
        }
    }

    if buffer.has_calls() {
        debug!(calls = buffer.calls.len(), "emitting tool-call envelope, suppressing buffered text");
        let envelope = ToolCallEnvelope::new(buffer.calls);
        let bytes = envelope
            .to_json_bytes()
            .map_err(flow_core::FlowError::from)?;
        response.data.write(bytes.into()).await?;
    }
    response.data.close();

    if let (Some(usage), Some(callback)) = (usage, usage_callback) {
        callback(&usage);
    }
    Ok(())
}
