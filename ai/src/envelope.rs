//! Wire-visible JSON shapes: the Tool-Call Envelope emitted by AI
//! adapters, and the Multimodal Envelope accepted as adapter input.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};

/// One function-call request from the provider. `arguments` is always a
/// JSON-encoded string, never a nested object, so downstream tool
/// executors can parse it provider-agnostically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments. Kept as a string on the wire even when the
    /// underlying payload is structured — see `ToolCall::new`.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCall {
    Function { function: FunctionCall },
}

impl ToolCall {
    /// Build a function tool call, serializing `arguments` to a JSON
    /// string if it isn't already one. `arguments` is always a JSON
    /// string on the wire, never an object, even if the underlying
    /// payload is structured.
    pub fn function(name: impl Into<String>, arguments: impl Serialize) -> AgentResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(AgentError::InvalidEnvelope(
                "tool call name must be non-empty".to_string(),
            ));
        }
        let arguments = serde_json::to_string(&arguments)
            .map_err(|e| AgentError::InvalidEnvelope(format!("arguments not serializable: {e}")))?;
        Ok(ToolCall::Function {
            function: FunctionCall { name, arguments },
        })
    }

    pub fn name(&self) -> &str {
        match self {
            ToolCall::Function { function } => &function.name,
        }
    }

    pub fn arguments(&self) -> &str {
        match self {
            ToolCall::Function { function } => &function.arguments,
        }
    }
}

/// Canonical JSON emitted when the provider elects to invoke tools:
/// `{"tool_calls":[{"type":"function","function":
/// {"name":..., "arguments":...}}, ...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEnvelope {
    pub tool_calls: Vec<ToolCall>,
}

impl ToolCallEnvelope {
    pub fn new(tool_calls: Vec<ToolCall>) -> Self {
        Self { tool_calls }
    }

    pub fn to_json_bytes(&self) -> AgentResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AgentError::InvalidEnvelope(format!("failed to encode envelope: {e}")))
    }

    /// Parse a previously emitted envelope back into `(name,
    /// arguments_string)` pairs.
    pub fn from_json_bytes(bytes: &[u8]) -> AgentResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| AgentError::InvalidEnvelope(format!("failed to decode envelope: {e}")))
    }

    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.tool_calls
            .iter()
            .map(|c| (c.name(), c.arguments()))
            .collect()
    }
}

/// One ordered part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MultimodalPart {
    Text {
        text: String,
    },
    Image(BinaryPart),
    Audio(BinaryPart),
    Video(BinaryPart),
}

/// For a non-text part, exactly one of an inline byte payload ("serialized")
/// or an out-of-band attachment reference ("streaming") is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryPart {
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "ref")]
    pub attachment_ref: Option<String>,
}

impl BinaryPart {
    pub fn is_streaming(&self) -> bool {
        self.attachment_ref.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultimodalEnvelope {
    pub parts: Vec<MultimodalPart>,
}

impl MultimodalEnvelope {
    pub fn from_json_bytes(bytes: &[u8]) -> AgentResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| AgentError::InvalidEnvelope(format!("failed to decode envelope: {e}")))
    }

    /// Whether the caller must supply an attachment table: true as soon
    /// as any part uses `ref` instead of inline `data`. When any part
    /// uses `ref`, the caller must pass the attachment table through
    /// options.
    pub fn requires_attachments(&self) -> bool {
        self.parts.iter().any(|p| match p {
            MultimodalPart::Text { .. } => false,
            MultimodalPart::Image(b) | MultimodalPart::Audio(b) | MultimodalPart::Video(b) => {
                b.is_streaming()
            }
        })
    }
}

/// Out-of-band table resolving attachment ids to raw bytes, passed
/// alongside the stream rather than embedded in it.
#[derive(Debug, Clone, Default)]
pub struct AttachmentTable(HashMap<String, Vec<u8>>);

impl AttachmentTable {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, id: impl Into<String>, bytes: Vec<u8>) {
        self.0.insert(id.into(), bytes);
    }

    pub fn get(&self, id: &str) -> AgentResult<&[u8]> {
        self.0
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| AgentError::MissingAttachment(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_arguments_are_always_a_json_string() {
        #[derive(Serialize)]
        struct Args {
            city: String,
        }
        let call = ToolCall::function(
            "get_weather",
            Args {
                city: "Lyon".to_string(),
            },
        )
        .unwrap();
        assert_eq!(call.name(), "get_weather");
        // the wire field is a JSON string, not a nested object:
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&call).unwrap()).unwrap();
        assert!(value["function"]["arguments"].is_string());
        let parsed: Args = serde_json::from_str(call.arguments()).unwrap();
        assert_eq!(parsed.city, "Lyon");
    }

    #[test]
    fn empty_tool_name_is_rejected() {
        let err = ToolCall::function("", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, AgentError::InvalidEnvelope(_)));
    }

    #[test]
    fn envelope_round_trips() {
        let envelope = ToolCallEnvelope::new(vec![
            ToolCall::function("a", serde_json::json!({"x": 1})).unwrap(),
            ToolCall::function("b", serde_json::json!({"y": 2})).unwrap(),
        ]);
        let bytes = envelope.to_json_bytes().unwrap();
        let parsed = ToolCallEnvelope::from_json_bytes(&bytes).unwrap();
        assert_eq!(parsed.pairs(), envelope.pairs());
    }

    #[test]
    fn requires_attachments_detects_ref_parts() {
        let inline = MultimodalEnvelope {
            parts: vec![MultimodalPart::Image(BinaryPart {
                mime: "image/jpeg".to_string(),
                data: Some("YWJj".to_string()),
                attachment_ref: None,
            })],
        };
        assert!(!inline.requires_attachments());

        let streaming = MultimodalEnvelope {
            parts: vec![MultimodalPart::Image(BinaryPart {
                mime: "image/jpeg".to_string(),
                data: None,
                attachment_ref: Some("att-1".to_string()),
            })],
        };
        assert!(streaming.requires_attachments());
    }

    #[test]
    fn attachment_table_missing_id_errors() {
        let table = AttachmentTable::new();
        assert!(matches!(
            table.get("missing"),
            Err(AgentError::MissingAttachment(_))
        ));
    }
}
