//! Input classification for the AI agent wrapper: the first step before
//! an agent drives a provider turn.

use flow_core::Buffer;

use crate::envelope::MultimodalEnvelope;

#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    /// Raw bytes, passed to the provider as plain text.
    Text(String),
    /// JSON envelope with every non-text part inlined (`data`, no `ref`).
    MultimodalJson(MultimodalEnvelope),
    /// JSON envelope where at least one part is a `ref`; the caller must
    /// resolve those ids against an `AttachmentTable` supplied via
    /// `AgentOptions`.
    MultimodalStreaming(MultimodalEnvelope),
}

/// Classify a fully-buffered request body. A JSON object whose top-level
/// shape matches `{"parts": [...]}` is treated as a multimodal envelope;
/// anything else (including malformed JSON) falls back to plain text,
/// since text input is never required to be valid JSON.
pub fn classify(buffer: &Buffer) -> InputKind {
    let trimmed = buffer.as_str_lossy();
    let trimmed = trimmed.trim_start();
    if !trimmed.starts_with('{') {
        return InputKind::Text(buffer.as_str_lossy().into_owned());
    }
    match MultimodalEnvelope::from_json_bytes(buffer.as_bytes()) {
        Ok(envelope) if !envelope.parts.is_empty() => {
            if envelope.requires_attachments() {
                InputKind::MultimodalStreaming(envelope)
            } else {
                InputKind::MultimodalJson(envelope)
            }
        }
        _ => InputKind::Text(buffer.as_str_lossy().into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{BinaryPart, MultimodalPart};

    #[test]
    fn plain_text_is_classified_as_text() {
        let buf = Buffer::from_str("hello, how are you?");
        assert_eq!(
            classify(&buf),
            InputKind::Text("hello, how are you?".to_string())
        );
    }

    #[test]
    fn json_without_parts_field_falls_back_to_text() {
        let buf = Buffer::from_str(r#"{"foo": "bar"}"#);
        assert!(matches!(classify(&buf), InputKind::Text(_)));
    }

    #[test]
    fn inline_multimodal_envelope_is_json_kind() {
        let envelope = MultimodalEnvelope {
            parts: vec![
                MultimodalPart::Text {
                    text: "describe this".to_string(),
                },
                MultimodalPart::Image(BinaryPart {
                    mime: "image/jpeg".to_string(),
                    data: Some("aGVsbG8=".to_string()),
                    attachment_ref: None,
                }),
            ],
        };
        let json = serde_json::to_vec(&envelope).unwrap();
        let buf = Buffer::from_bytes(json);
        assert!(matches!(classify(&buf), InputKind::MultimodalJson(_)));
    }

    #[test]
    fn ref_multimodal_envelope_is_streaming_kind() {
        let envelope = MultimodalEnvelope {
            parts: vec![MultimodalPart::Audio(BinaryPart {
                mime: "audio/wav".to_string(),
                data: None,
                attachment_ref: Some("att-1".to_string()),
            })],
        };
        let json = serde_json::to_vec(&envelope).unwrap();
        let buf = Buffer::from_bytes(json);
        assert!(matches!(classify(&buf), InputKind::MultimodalStreaming(_)));
    }
}
