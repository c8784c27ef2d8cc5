//! Provider client interface: the external collaborator the Agent
//! drives. Concrete provider wire protocols (Gemini/OpenAI/Ollama) are
//! out of scope; this crate only defines the contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::AttachmentTable;
use crate::usage::UsageCallback;

/// One of the two response-shape constraints a caller may request from
/// the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSchema {
    JsonObject,
    JsonSchema(String),
}

/// A single callable tool description, opaquely passed through to the
/// provider. The schema is provider-specific JSON and is not interpreted
/// by the Agent.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Options threaded through `Agent::serve_flow` into `ProviderClient::chat`.
/// `usage_callback` is invoked at most once per call, by the Agent itself
/// after the client reports final usage, never by the client directly.
#[derive(Default)]
pub struct AgentOptions {
    pub tools: Vec<ToolSchema>,
    pub response_schema: Option<ResponseSchema>,
    pub attachments: Option<AttachmentTable>,
    pub usage_callback: Option<UsageCallback>,
    /// Provider-specific configuration, opaquely wrapped.
    pub provider_config: HashMap<String, String>,
}

impl AgentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_response_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_attachments(mut self, table: AttachmentTable) -> Self {
        self.attachments = Some(table);
        self
    }

    pub fn with_usage_callback(mut self, callback: UsageCallback) -> Self {
        self.usage_callback = Some(callback);
        self
    }
}

/// One chunk of a provider's streaming response. The client is
/// responsible for splitting a raw provider stream into these; the Agent
/// consumes them and applies the hybrid buffering rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatChunk {
    pub text: Option<String>,
    pub function_calls: Vec<crate::envelope::ToolCall>,
    /// Present on the chunk that concludes the turn.
    pub usage: Option<crate::usage::UsageMetadata>,
}

impl ChatChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_calls: Vec::new(),
            usage: None,
        }
    }

    pub fn function_call(call: crate::envelope::ToolCall) -> Self {
        Self {
            text: None,
            function_calls: vec![call],
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: crate::usage::UsageMetadata) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// `Chat` streams chunks to the supplied sink rather than writing
/// `Response.Data` directly, so the Agent retains control of the hybrid
/// buffering decision. One call = one conversation turn; the Agent does
/// not assume the client is safe to call concurrently from multiple
/// turns at once.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn chat(
        &self,
        prompt: &str,
        options: &AgentOptions,
        sink: Arc<dyn ChatSink>,
    ) -> crate::error::AgentResult<()>;
}

/// Sink the client pushes chunks into as they arrive from the wire.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn push(&self, chunk: ChatChunk);
}
