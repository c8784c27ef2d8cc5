//! `Transform`: lifts a pure `String -> String` function into a
//! `Handler`. The primary non-streaming handler, offered for user
//! convenience — the design explicitly tolerates the buffering since
//! users opt into it by choosing `Transform`.

use async_trait::async_trait;

use crate::error::FlowResult;
use crate::handler::{Handler, Request, Response};

pub struct Transform<F> {
    f: F,
    name: String,
}

impl<F> Transform<F>
where
    F: Fn(String) -> String + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            name: "Transform".to_string(),
        }
    }

    pub fn named(name: impl Into<String>, f: F) -> Self {
        Self { f, name: name.into() }
    }
}

#[async_trait]
impl<F> Handler for Transform<F>
where
    F: Fn(String) -> String + Send + Sync,
{
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        let buffer = request.read_to_buffer().await?;
        let input = buffer.as_str_lossy().into_owned();
        let output = (self.f)(input);
        response.data.write_str(output).await?;
        response.data.close();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
