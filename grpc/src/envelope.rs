//! Wire-visible JSON shapes for the design-level remote handler. These
//! are the canonical "Flow request"/"Flow response" envelopes a concrete
//! `GrpcTransport` serializes onto whatever the actual wire protocol is
//! (protobuf, in this design's case, though this crate never generates
//! or links against one).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `{input: string, metadata: map<string,string>}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowRequestEnvelope {
    pub input: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl FlowRequestEnvelope {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// `{output: string, success: bool, error_message: string, metadata:
/// map<string,string>}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowResponseEnvelope {
    pub output: String,
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl FlowResponseEnvelope {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
            error_message: String::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            success: false,
            error_message: error_message.into(),
            metadata: HashMap::new(),
        }
    }
}

/// The streaming counterpart of `FlowResponseEnvelope`: additionally
/// carries `is_final` so the receiving task knows when to stop forwarding
/// messages into `Response.Data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamResponseEnvelope {
    pub output: String,
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub is_final: bool,
}
