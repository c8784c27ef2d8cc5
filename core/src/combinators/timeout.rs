//! `Timeout`: derives a deadline-bound context, runs `inner` against it,
//! and returns `DeadlineExceeded` without waiting for `inner` if the
//! deadline fires first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{FlowError, FlowResult};
use crate::handler::{BoxHandler, Handler, Request, Response};

pub struct Timeout {
    inner: BoxHandler,
    duration: Duration,
    name: String,
}

impl Timeout {
    pub fn new(inner: impl Handler + 'static, duration: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            duration,
            name: format!("Timeout({duration:?})"),
        }
    }
}

#[async_trait]
impl Handler for Timeout {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        let deadline_ctx = request.context.with_deadline(self.duration);
        let req = Request::new(deadline_ctx.clone(), request.data);
        let inner = self.inner.clone();

        let task = tokio::spawn(async move { inner.serve_flow(req, response).await });

        tokio::select! {
            joined = task => {
                match joined {
                    Ok(result) => result,
                    Err(join_err) => Err(FlowError::internal(format!(
                        "timeout inner handler panicked: {join_err}"
                    ))),
                }
            }
            _ = deadline_ctx.cancelled() => {
                // Deadline fired (or an external cancellation raced it).
                // Don't wait for `inner`; it keeps running detached and
                // observes `deadline_ctx` cancellation at its own next
                // suspension point via the same `cancelled()` race.
                warn!(duration = ?self.duration, "deadline fired before inner handler returned");
                Err(deadline_ctx.cancellation_error(format!(
                    "timeout after {:?}", self.duration
                )))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::converter::{StringInput, StringOutput};
    use crate::flow::Flow;
    use crate::handler::FnHandler;

    fn slow_processor(delay: Duration) -> FnHandler<impl Fn(Request, Response) -> futures::future::BoxFuture<'static, FlowResult<()>> + Send + Sync>
    {
        FnHandler::new("slow", move |req: Request, resp: Response| {
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                let buf = req.read_to_buffer().await?;
                resp.data
                    .write_str(format!("processed: {}", buf.as_str_lossy()))
                    .await?;
                resp.data.close();
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn deadline_exceeded_when_inner_is_slower() {
        let flow = Flow::new().use_handler(Timeout::new(
            slow_processor(Duration::from_millis(100)),
            Duration::from_millis(30),
        ));
        let err = flow
            .run(
                Context::new(),
                "test".to_string(),
                &StringInput,
                &StringOutput,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DeadlineExceeded);
    }

    #[tokio::test]
    async fn passes_through_when_inner_is_faster() {
        let flow = Flow::new().use_handler(Timeout::new(
            slow_processor(Duration::from_millis(10)),
            Duration::from_millis(200),
        ));
        let out = flow
            .run(
                Context::new(),
                "test".to_string(),
                &StringInput,
                &StringOutput,
            )
            .await
            .unwrap();
        assert_eq!(out, "processed: test");
    }
}
