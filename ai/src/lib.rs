//! AI agent wrapper over the pipeline runtime: input classification, the
//! hybrid text/tool-call streaming rule, and the canonical Tool-Call /
//! Multimodal envelope wire shapes.

pub mod agent;
pub mod classify;
pub mod client;
pub mod envelope;
pub mod error;
pub mod usage;

pub use agent::Agent;
pub use classify::InputKind;
pub use client::{AgentOptions, ChatChunk, ChatSink, ProviderClient, ResponseSchema, ToolSchema};
pub use envelope::{
    AttachmentTable, BinaryPart, FunctionCall, MultimodalEnvelope, MultimodalPart, ToolCall,
    ToolCallEnvelope,
};
pub use error::{AgentError, AgentResult};
pub use usage::{UsageCallback, UsageMetadata};
