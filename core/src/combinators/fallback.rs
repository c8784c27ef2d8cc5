//! `Fallback`: runs `primary` against the buffered input; on a retryable
//! error, re-runs `alt` against the same buffered input. Non-retryable
//! errors propagate immediately.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::FlowResult;
use crate::handler::{BoxHandler, Handler, Request, Response};

use super::util::run_buffered;

pub struct Fallback {
    primary: BoxHandler,
    alt: BoxHandler,
    name: String,
}

impl Fallback {
    pub fn new(primary: impl Handler + 'static, alt: impl Handler + 'static) -> Self {
        Self {
            primary: Arc::new(primary),
            alt: Arc::new(alt),
            name: "Fallback".to_string(),
        }
    }
}

#[async_trait]
impl Handler for Fallback {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        let Request { context, data } = request;
        let buffer = data.read_to_buffer().await?;

        match run_buffered(&self.primary, context.clone(), &buffer).await {
            Ok(bytes) => {
                response.data.write(bytes).await?;
                response.data.close();
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                warn!(kind = ?e.kind(), "primary failed with a retryable error, invoking fallback");
                let bytes = run_buffered(&self.alt, context, &buffer).await?;
                response.data.write(bytes).await?;
                response.data.close();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
