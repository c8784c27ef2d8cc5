//! `Retry` (included since it composes trivially on top of the buffered
//! snapshot `Fallback` already requires): re-invokes `inner` on retryable
//! errors up to `max_attempts`, replaying the buffered input each time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::FlowResult;
use crate::handler::{BoxHandler, Handler, Request, Response};

use super::util::run_buffered;

/// Backoff policy between attempts: fixed-delay by default, with an
/// optional exponential multiplier capped at a maximum delay — a small
/// hand-rolled policy, not the `backoff` crate.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(d) => *d,
            Backoff::Exponential { base, max } => {
                let scaled = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
                scaled.min(*max)
            }
        }
    }
}

pub struct Retry {
    inner: BoxHandler,
    max_attempts: u32,
    backoff: Backoff,
    name: String,
}

impl Retry {
    pub fn new(inner: impl Handler + 'static, max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            inner: Arc::new(inner),
            max_attempts: max_attempts.max(1),
            backoff,
            name: format!("Retry({max_attempts})"),
        }
    }
}

#[async_trait]
impl Handler for Retry {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        let Request { context, data } = request;
        let buffer = data.read_to_buffer().await?;

        let mut attempt = 0;
        loop {
            match run_buffered(&self.inner, context.clone(), &buffer).await {
                Ok(bytes) => {
                    if attempt > 0 {
                        debug!(attempt, "retry succeeded");
                    }
                    response.data.write(bytes).await?;
                    response.data.close();
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    attempt += 1;
                    warn!(attempt, max_attempts = self.max_attempts, kind = ?e.kind(), "retryable failure, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(self.backoff.delay_for(attempt)) => {}
                        _ = context.cancelled() => {
                            return Err(context.cancellation_error("cancelled during retry backoff"));
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
