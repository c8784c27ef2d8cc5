//! `Branch`: buffers the input, evaluates a predicate on the buffered
//! string, and dispatches to exactly one of two sub-handlers with the
//! same buffered input. The non-selected sub-handler never runs.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FlowResult;
use crate::handler::{BoxHandler, Handler, Request, Response};
use crate::stream::Buffer;

use super::util::run_buffered;

/// A predicate evaluated against the buffered input's lossy UTF-8 view.
pub type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub struct Branch {
    predicate: Predicate,
    if_true: BoxHandler,
    if_false: BoxHandler,
    name: String,
}

impl Branch {
    pub fn new(
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
        if_true: impl Handler + 'static,
        if_false: impl Handler + 'static,
    ) -> Self {
        Self {
            predicate: Arc::new(predicate),
            if_true: Arc::new(if_true),
            if_false: Arc::new(if_false),
            name: "Branch".to_string(),
        }
    }
}

#[async_trait]
impl Handler for Branch {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        let Request { context, data } = request;
        let buffer: Buffer = data.read_to_buffer().await?;
        let selected = if (self.predicate)(buffer.as_str_lossy().as_ref()) {
            &self.if_true
        } else {
            &self.if_false
        };

        let bytes = run_buffered(selected, context, &buffer).await?;
        response.data.write(bytes).await?;
        response.data.close();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
