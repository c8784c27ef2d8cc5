//! Shared plumbing for the buffered-snapshot combinators (`Parallel`,
//! `Fallback`, `Branch`, `Retry`): run one sub-handler against an
//! independent reader over an already-materialized `Buffer` and collect
//! its output into memory.

use crate::context::Context;
use crate::error::FlowResult;
use crate::handler::{BoxHandler, Handler, Request, Response};
use crate::stream::{pipe, Buffer, DEFAULT_PIPE_CAPACITY};

pub(crate) async fn run_buffered(
    handler: &BoxHandler,
    context: Context,
    buffer: &Buffer,
) -> FlowResult<Vec<u8>> {
    let (writer, mut out_reader) = pipe(DEFAULT_PIPE_CAPACITY);
    let request = Request::new(context, buffer.reader());
    let response = Response::new(writer);

    let serve = handler.serve_flow(request, response);
    let drain = async {
        let mut collected = Vec::new();
        loop {
            match out_reader.read().await {
                Ok(Some(chunk)) => collected.extend_from_slice(&chunk),
                Ok(None) => return Ok(collected),
                Err(e) => return Err(e),
            }
        }
    };

    let (serve_result, drain_result) = tokio::join!(serve, drain);
    serve_result?;
    drain_result
}
