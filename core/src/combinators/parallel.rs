//! `Parallel`: runs each sub-handler against a snapshot of the input,
//! concatenating their outputs in declaration order regardless of which
//! branch finishes first.

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::error::{FlowError, FlowResult};
use crate::handler::{BoxHandler, Handler, Request, Response};

use super::util::run_buffered;

pub struct Parallel {
    handlers: Vec<BoxHandler>,
    name: String,
}

impl Parallel {
    pub fn new(handlers: Vec<BoxHandler>) -> Self {
        let name = format!("Parallel({})", handlers.len());
        Self { handlers, name }
    }
}

#[async_trait]
impl Handler for Parallel {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        let Request { context, data } = request;
        // Fully materialize input before dispatching to any branch.
        let buffer = data.read_to_buffer().await?;

        let mut pending = FuturesUnordered::new();
        for (index, handler) in self.handlers.iter().cloned().enumerate() {
            let ctx = context.clone();
            let buf = buffer.clone();
            pending.push(async move { (index, run_buffered(&handler, ctx, &buf).await) });
        }

        let mut slots: Vec<Option<Vec<u8>>> = vec![None; self.handlers.len()];
        let mut first_error: Option<FlowError> = None;
        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(bytes) => slots[index] = Some(bytes),
                Err(e) => {
                    if first_error.is_none() {
                        context.cancel();
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        // Declaration-order concatenation, independent of completion
        // order above.
        let mut out = Vec::new();
        for slot in slots {
            out.extend(slot.expect("every branch completed without error"));
        }
        response.data.write(out).await?;
        response.data.close();
        Ok(())
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
    use std::sync::Arc;
    use std::time::Duration;

    fn labeled(label: &'static str, delay: Duration) -> Arc<dyn Handler> {
        Arc::new(FnHandler::new(label, move |req: Request, resp: Response| {
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                let buf = req.read_to_buffer().await?;
                resp.data
                    .write_str(format!("{label}: {}", buf.as_str_lossy()))
                    .await?;
                resp.data.close();
                Ok(())
            })
        }))
    }

    #[tokio::test]
    async fn declaration_order_regardless_of_completion_order() {
        // h1 is the slowest, h3 the fastest: completion order is 3,2,1 but
        // output must read 1,2,3.
        let parallel = Parallel::new(vec![
            labeled("H1", Duration::from_millis(30)),
            labeled("H2", Duration::from_millis(15)),
            labeled("H3", Duration::from_millis(0)),
        ]);
        let flow = Flow::new().use_handler(parallel);
        let out = flow
            .run(
                Context::new(),
                "test".to_string(),
                &StringInput,
                &StringOutput,
            )
            .await
            .unwrap();
        assert_eq!(out, "H1: testH2: testH3: test");
    }

    #[tokio::test]
    async fn error_in_one_branch_fails_the_whole_combinator() {
        let failing: Arc<dyn Handler> = Arc::new(FnHandler::new(
            "failing",
            |_req: Request, _resp: Response| {
                Box::pin(async move { Err(FlowError::retryable("branch failed")) })
            },
        ));
        let parallel = Parallel::new(vec![labeled("ok", Duration::ZERO), failing]);
        let flow = Flow::new().use_handler(parallel);
        let err = flow
            .run(
                Context::new(),
                "x".to_string(),
                &StringInput,
                &StringOutput,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Retryable);
    }
}
