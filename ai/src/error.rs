//! Error type for the AI agent wrapper.
//!
//! Thin `thiserror` wrapper over `flow_core::FlowError`: classification
//! and propagation into the pipeline runtime stay in `flow-core`, this
//! crate only adds the provider/envelope-shaped variants that are local
//! to `flow-ai`.

use thiserror::Error;

pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("pipeline error: {0}")]
    Flow(#[from] flow_core::FlowError),

    #[error("malformed multimodal envelope: {0}")]
    InvalidEnvelope(String),

    #[error("referenced attachment '{0}' is missing from the attachment table")]
    MissingAttachment(String),

    #[error("provider client error: {0}")]
    Provider(String),
}

impl From<AgentError> for flow_core::FlowError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Flow(e) => e,
            AgentError::InvalidEnvelope(msg) => flow_core::FlowError::invalid_input(msg),
            AgentError::MissingAttachment(msg) => flow_core::FlowError::invalid_input(format!(
                "missing attachment: {msg}"
            )),
            AgentError::Provider(msg) => flow_core::FlowError::internal(msg),
        }
    }
}
