//! `Chain`: composes `[a, b, c]` into a single handler whose output of
//! `a` becomes the input of `b`, etc. Packaged as one unit so it can be
//! nested inside other combinators; semantically identical to a `Flow`
//! of the same handlers (associative regardless of nesting).

use async_trait::async_trait;

use crate::error::FlowResult;
use crate::flow::Flow;
use crate::handler::{BoxHandler, Handler, Request, Response};

pub struct Chain {
    inner: Flow,
    name: String,
}

impl Chain {
    pub fn new(handlers: Vec<BoxHandler>) -> Self {
        let count = handlers.len();
        let mut inner = Flow::new();
        for handler in handlers {
            inner = inner.use_boxed(handler);
        }
        Self {
            inner,
            name: format!("Chain({count})"),
        }
    }

    pub fn of<const N: usize>(handlers: [BoxHandler; N]) -> Self {
        Self::new(handlers.into_iter().collect())
    }
}

#[async_trait]
impl Handler for Chain {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        self.inner
            .execute(request.context, request.data, response.data)
            .await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
