//! The flow composer: wires a sequence of handlers with intermediate
//! pipes and runs them as concurrent tasks.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tracing::{debug, error, warn};

use crate::context::Context;
use crate::converter::{InputConverter, OutputConverter};
use crate::error::{ErrorKind, FlowError, FlowResult};
use crate::handler::{BoxHandler, Handler, Request, Response};
use crate::metrics::{FlowMetrics, StageOutcome};
use crate::stream::{pipe, DataReader, DataWriter, DEFAULT_PIPE_CAPACITY};

/// An ordered sequence of handlers executed as a pipeline. Immutable once
/// a run begins — `use_handler` consumes and returns `self`, so a `Flow`
/// under concurrent execution cannot be mutated through the same handle;
/// appending a handler to a `Flow` while it is running is undefined.
pub struct Flow {
    stages: Vec<BoxHandler>,
    metrics: Option<Arc<dyn FlowMetrics>>,
    pipe_capacity: usize,
    name: String,
}

/// `NewFlow()` — an empty pipeline.
impl Flow {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            metrics: None,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            name: "Flow()".to_string(),
        }
    }

    /// `Flow.Use(handler) -> Flow`: append a stage, returning the same
    /// (owned) `Flow` for chaining.
    #[must_use]
    pub fn use_handler(mut self, handler: impl Handler + 'static) -> Self {
        self.stages.push(Arc::new(handler));
        self.name = format!("Flow({})", self.stages.len());
        self
    }

    /// Append an already-boxed handler (used when composing dynamically
    /// built stage lists).
    #[must_use]
    pub fn use_boxed(mut self, handler: BoxHandler) -> Self {
        self.stages.push(handler);
        self.name = format!("Flow({})", self.stages.len());
        self
    }

    /// Convenience over `Branch`-free conditional composition: append
    /// `handler` only when `cond` is true, otherwise leave the pipeline
    /// untouched. A small ergonomic builder method alongside `use_handler`.
    #[must_use]
    pub fn use_if(self, cond: bool, handler: impl Handler + 'static) -> Self {
        if cond {
            self.use_handler(handler)
        } else {
            self
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: impl FlowMetrics + 'static) -> Self {
        self.metrics = Some(Arc::new(metrics));
        self
    }

    #[must_use]
    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// `Flow.Run(context, input, output_destination) -> error`, adapted to
    /// Rust: the input/output converters are passed explicitly rather
    /// than bound into the `Flow` value, so that `Flow` itself stays
    /// non-generic and can implement the plain `Handler` trait (a `Flow`
    /// is itself valid as a handler).
    pub async fn run<I, O>(
        &self,
        context: Context,
        input: I,
        input_converter: &(dyn InputConverter<I> + Sync),
        output_converter: &(dyn OutputConverter<O> + Sync),
    ) -> FlowResult<O> {
        let reader = input_converter.convert(input).await?;
        let (writer, out_reader) = pipe(self.pipe_capacity);

        let (exec_result, conv_result) = tokio::join!(
            self.execute(context, reader, writer),
            output_converter.convert(out_reader),
        );

        match exec_result {
            Err(e) => Err(e),
            Ok(()) => conv_result,
        }
    }

    /// Core execution: build `S0` from `input`, allocate one pipe per
    /// internal stage boundary, launch one concurrent task per handler,
    /// and forward the last stage's output into `output`. Used both by
    /// `run` and by `Flow`'s own `Handler` impl,
    /// so a `Flow` nested inside another `Flow` or combinator runs exactly
    /// this same wiring against the enclosing `Request`/`Response`.
    pub async fn execute(
        &self,
        context: Context,
        input: DataReader,
        output: DataWriter,
    ) -> FlowResult<()> {
        let n = self.stages.len();
        debug!(flow = %self.name, stages = n, "executing flow");
        if n == 0 {
            return forward_stream(input, output).await;
        }

        // `stage_writers[i]` is what stage i's Response writes to: an
        // internal pipe for i < n-1, or `output` for the last stage.
        let mut stage_readers: Vec<DataReader> = Vec::with_capacity(n);
        let mut stage_writers: Vec<DataWriter> = Vec::with_capacity(n);
        stage_readers.push(input);
        for _ in 0..n.saturating_sub(1) {
            let (w, r) = pipe(self.pipe_capacity);
            stage_writers.push(w);
            stage_readers.push(r);
        }
        stage_writers.push(output);

        // A forked handle per stage, retained here even after the
        // original is moved into that stage's Response. Lets the composer
        // close a stage's downstream pipe with a specific error the
        // moment that stage's task fails, instead of letting downstream
        // see a generic broken-pipe failure.
        let mut flow_side: Vec<Option<DataWriter>> =
            stage_writers.iter().map(|w| Some(w.fork())).collect();

        let mut pending = FuturesUnordered::new();
        for (i, (handler, (req, resp))) in self
            .stages
            .iter()
            .cloned()
            .zip(stage_readers.into_iter().zip(stage_writers.into_iter()))
            .enumerate()
        {
            let ctx = context.clone();
            let metrics = self.metrics.clone();
            let handle = tokio::spawn(run_stage(i, handler, ctx, req, resp, metrics));
            pending.push(async move { (i, handle.await) });
        }

        let mut first_error: Option<FlowError> = None;
        while let Some((i, joined)) = pending.next().await {
            let stage_name = self.stages[i].name().to_string();
            let stage_result = match joined {
                Ok(result) => result,
                Err(join_err) => {
                    error!(flow = %self.name, stage = %stage_name, %join_err, "handler task panicked");
                    Err(FlowError::internal(format!(
                        "handler task {i} ('{stage_name}') panicked: {join_err}"
                    )))
                }
            };

            match stage_result {
                Ok(()) => {
                    debug!(flow = %self.name, stage = %stage_name, "stage completed");
                    // Drop our retained handle so the pipe closes cleanly
                    // once the stage's own Response is also gone.
                    flow_side[i] = None;
                }
                Err(e) => {
                    warn!(flow = %self.name, stage = %stage_name, kind = ?e.kind(), "stage failed, cancelling siblings");
                    context.cancel();
                    if let Some(writer) = flow_side[i].take() {
                        writer.close_with_error(e.duplicate()).await;
                    }
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for Flow {
    fn default() -> Self {
        Self::new()
    }
}

/// A `Flow` is itself valid as a handler: its `serve_flow` runs the
/// sub-flow against the enclosing `Request`/`Response`.
#[async_trait]
impl Handler for Flow {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        self.execute(request.context, request.data, response.data)
            .await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

async fn run_stage(
    index: usize,
    handler: BoxHandler,
    context: Context,
    request_data: DataReader,
    response_data: DataWriter,
    metrics: Option<Arc<dyn FlowMetrics>>,
) -> FlowResult<()> {
    let name = handler.name().to_string();
    let start = Instant::now();
    debug!(stage = %name, index, "starting handler task");
    let request = Request::new(context, request_data);
    let response = Response::new(response_data);

    let result = match AssertUnwindSafe(handler.serve_flow(request, response))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(stage = %name, index, %message, "handler panicked, recovering as Internal error");
            Err(FlowError::internal(format!(
                "handler '{name}' (stage {index}) panicked: {message}"
            )))
        }
    };

    if let Some(metrics) = &metrics {
        let outcome = match &result {
            Ok(()) => StageOutcome::Ok,
            Err(e) if matches!(e.kind(), ErrorKind::Cancelled | ErrorKind::DeadlineExceeded) => {
                StageOutcome::Cancelled
            }
            Err(_) => StageOutcome::Err,
        };
        metrics.record_stage(&name, start.elapsed(), outcome);
    }

    result
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Identity copy used when a `Flow` has zero stages: every byte read from
/// `input` is forwarded to `output` unchanged — the degenerate n=0 case
/// of the ordering property every `Flow` preserves.
async fn forward_stream(mut input: DataReader, output: DataWriter) -> FlowResult<()> {
    loop {
        match input.read().await {
            Ok(Some(chunk)) => output.write(chunk).await?,
            Ok(None) => {
                output.close();
                return Ok(());
            }
            Err(e) => {
                output.close_with_error(e.duplicate()).await;
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{StringInput, StringOutput};
    use crate::handler::FnHandler;

    fn uppercase_handler() -> FnHandler<impl Fn(Request, Response) -> futures::future::BoxFuture<'static, FlowResult<()>> + Send + Sync>
    {
        FnHandler::new("uppercase", |req: Request, resp: Response| {
            Box::pin(async move {
                let buf = req.read_to_buffer().await?;
                resp.data.write_str(buf.as_str_lossy().to_uppercase()).await?;
                resp.data.close();
                Ok(())
            })
        })
    }

    fn identity_handler() -> FnHandler<impl Fn(Request, Response) -> futures::future::BoxFuture<'static, FlowResult<()>> + Send + Sync>
    {
        FnHandler::new("identity", |mut req: Request, resp: Response| {
            Box::pin(async move {
                while let Some(chunk) = req.data.read().await? {
                    resp.data.write(chunk).await?;
                }
                resp.data.close();
                Ok(())
            })
        })
    }

    fn failing_handler(
        message: &'static str,
    ) -> FnHandler<impl Fn(Request, Response) -> futures::future::BoxFuture<'static, FlowResult<()>> + Send + Sync>
    {
        FnHandler::new("failing", move |_req: Request, _resp: Response| {
            Box::pin(async move { Err(FlowError::internal(message)) })
        })
    }

    async fn run_str(flow: &Flow, input: &str) -> FlowResult<String> {
        flow.run(
            Context::new(),
            input.to_string(),
            &StringInput,
            &StringOutput,
        )
        .await
    }

    #[tokio::test]
    async fn empty_flow_is_identity() {
        let flow = Flow::new();
        let out = run_str(&flow, "unchanged").await.unwrap();
        assert_eq!(out, "unchanged");
    }

    #[tokio::test]
    async fn single_stage_runs() {
        let flow = Flow::new().use_handler(uppercase_handler());
        let out = run_str(&flow, "hello").await.unwrap();
        assert_eq!(out, "HELLO");
    }

    #[tokio::test]
    async fn multi_stage_chains_in_order() {
        let flow = Flow::new()
            .use_handler(identity_handler())
            .use_handler(uppercase_handler())
            .use_handler(identity_handler());
        let out = run_str(&flow, "mixed Case").await.unwrap();
        assert_eq!(out, "MIXED CASE");
    }

    #[tokio::test]
    async fn error_short_circuits_and_cancels() {
        let flow = Flow::new()
            .use_handler(failing_handler("boom"))
            .use_handler(uppercase_handler());
        let ctx = Context::new();
        let err = flow
            .run(ctx.clone(), "x".to_string(), &StringInput, &StringOutput)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn use_if_conditionally_appends() {
        let included = Flow::new().use_if(true, uppercase_handler());
        assert_eq!(run_str(&included, "hi").await.unwrap(), "HI");

        let skipped = Flow::new().use_if(false, uppercase_handler());
        assert_eq!(run_str(&skipped, "hi").await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn nested_flow_is_a_handler() {
        let inner = Flow::new().use_handler(uppercase_handler());
        let outer = Flow::new().use_boxed(Arc::new(inner)).use_handler(identity_handler());
        let out = run_str(&outer, "nested").await.unwrap();
        assert_eq!(out, "NESTED");
    }
}
