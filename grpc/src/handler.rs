//! `Call(name)` and `Stream(name)`: handlers that invoke a registered remote
//! service, applying the per-service timeout and retry policy.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use flow_core::{FlowError, FlowResult, Handler, Request, Response};

use crate::envelope::FlowRequestEnvelope;
use crate::error::RemoteError;
use crate::registry::registry_from_context;

/// Unary remote call (`Call(name)`):
/// - reads `Request.Data` to bytes;
/// - wraps into a canonical `FlowRequestEnvelope`;
/// - invokes the remote service with the service's configured timeout;
/// - retries on retryable statuses up to the service's configured
///   `RetryPolicy`;
/// - writes the serialized response to `Response.Data`.
pub struct Call {
    service_name: String,
}

impl Call {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl Handler for Call {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        let Request { context, data } = request;
        let buffer = data.read_to_buffer().await?;
        let registry = registry_from_context(&context)?;
        let config = registry.config(&self.service_name).map_err(FlowError::from)?;
        let transport = registry
            .connection(&self.service_name)
            .await
            .map_err(FlowError::from)?;

        debug!(service = %self.service_name, timeout = ?config.timeout, "calling remote service");
        let req_envelope = FlowRequestEnvelope::new(buffer.as_str_lossy().into_owned())
            .with_metadata("trace_id", context.trace_id())
            .with_metadata("request_id", context.request_id());

        let mut attempt = 0;
        loop {
            tokio::select! {
                biased;
                _ = context.cancelled() => {
                    return Err(context.cancellation_error("cancelled while calling remote service"));
                }
                outcome = tokio::time::timeout(config.timeout, transport.call(req_envelope.clone())) => {
                    let result = match outcome {
                        Ok(inner) => inner,
                        Err(_elapsed) => Err(RemoteError::Timeout {
                            service: self.service_name.clone(),
                        }),
                    };
                    match result {
                        Ok(resp) if resp.success => {
                            response.data.write(Bytes::from(resp.output.into_bytes())).await?;
                            response.data.close();
                            return Ok(());
                        }
                        Ok(resp) => {
                            let err = RemoteError::status(
                                self.service_name.clone(),
                                crate::error::GrpcStatus::Internal,
                                resp.error_message,
                            );
                            if err.is_retryable() && attempt + 1 < config.retry.max_attempts {
                                attempt += 1;
                                warn!(service = %self.service_name, attempt, "retryable status, backing off");
                                tokio::time::sleep(config.retry.backoff).await;
                                continue;
                            }
                            return Err(err.into());
                        }
                        Err(e) if e.is_retryable() && attempt + 1 < config.retry.max_attempts => {
                            attempt += 1;
                            warn!(service = %self.service_name, attempt, "retryable transport error, backing off");
                            tokio::time::sleep(config.retry.backoff).await;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    fn name(&self) -> &str {
        "Call"
    }
}

/// Bidirectional streaming remote call (`Stream(name)`): one task reads
/// `Request.Data` in chunks and sends per-chunk request
/// messages; another receives response messages and writes them to
/// `Response.Data` in arrival order. Terminates on either side's close.
pub struct Stream {
    service_name: String,
}

impl Stream {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl Handler for Stream {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        let Request { context, mut data } = request;
        let registry = registry_from_context(&context)?;
        let (mut sender, mut receiver) = registry
            .connection(&self.service_name)
            .await
            .map_err(FlowError::from)?
            .open_stream()
            .await
            .map_err(FlowError::from)?;

        // One channel so the send loop's errors can unwind the recv loop
        // promptly instead of leaving it blocked on a stream that will
        // never produce more messages.
        let (err_tx, mut err_rx) = mpsc::channel::<FlowError>(1);

        let send_ctx = context.clone();
        let send_result = async {
            loop {
                tokio::select! {
                    biased;
                    _ = send_ctx.cancelled() => {
                        return Err(send_ctx.cancellation_error("cancelled while streaming to remote service"));
                    }
                    chunk = data.read() => {
                        match chunk? {
                            Some(bytes) => {
                                let envelope = FlowRequestEnvelope::new(
                                    String::from_utf8_lossy(&bytes).into_owned(),
                                );
                                sender.send(envelope).await.map_err(FlowError::from)?;
                            }
                            None => {
                                sender.close_send().await;
                                return Ok(());
                            }
                        }
                    }
                }
            }
        };

        let recv_result = async {
            loop {
                tokio::select! {
                    biased;
                    _ = context.cancelled() => {
                        return Err(context.cancellation_error("cancelled while receiving from remote service"));
                    }
                    Some(err) = err_rx.recv() => {
                        return Err(err);
                    }
                    msg = receiver.recv() => {
                        match msg.map_err(FlowError::from)? {
                            Some(env) if env.success => {
                                response.data.write(Bytes::from(env.output.into_bytes())).await?;
                                if env.is_final {
                                    response.data.close();
                                    return Ok(());
                                }
                            }
                            Some(env) => {
                                return Err(crate::error::RemoteError::status(
                                    self.service_name.clone(),
                                    crate::error::GrpcStatus::Internal,
                                    env.error_message,
                                )
                                .into());
                            }
                            None => {
                                response.data.close();
                                return Ok(());
                            }
                        }
                    }
                }
            }
        };

        // Drive both halves concurrently; a send-side failure must also
        // unblock a recv loop that would otherwise wait forever on a dead
        // stream.
        tokio::pin!(recv_result);
        tokio::select! {
            send_res = send_result => {
                if let Err(e) = send_res {
                    let _ = err_tx.send(e.duplicate()).await;
                    return recv_result.await.and(Err(e));
                }
                recv_result.await
            }
            recv_res = &mut recv_result => {
                recv_res
            }
        }
    }

    fn name(&self) -> &str {
        "Stream"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use flow_core::converter::{StringInput, StringOutput};
    use flow_core::{Context, Flow};

    use super::*;
    use crate::registry::{InstallRegistry, RetryPolicy, ServiceConfig, ServiceRegistry};
    use crate::testing::{EchoConnector, FlakyConnector};

    fn flow_with_registry(registry: Arc<ServiceRegistry>, handler: impl Handler + 'static) -> Flow {
        Flow::new()
            .use_handler(InstallRegistry::new(registry))
            .use_handler(handler)
    }

    #[tokio::test]
    async fn call_round_trips_through_echo_transport() {
        let registry = Arc::new(ServiceRegistry::new(Arc::new(EchoConnector::default())));
        registry.register(
            "trtllm",
            ServiceConfig::new("trtllm:50051", Duration::from_secs(1)),
        );
        let flow = flow_with_registry(registry, Call::new("trtllm"));
        let out = flow
            .run(Context::new(), "ping".to_string(), &StringInput, &StringOutput)
            .await
            .unwrap();
        assert_eq!(out, "echo:ping");
    }

    #[tokio::test]
    async fn call_retries_retryable_failures_then_succeeds() {
        let connector = Arc::new(FlakyConnector::new(2));
        let registry = Arc::new(ServiceRegistry::new(connector));
        registry.register(
            "flaky",
            ServiceConfig::new("flaky:50051", Duration::from_secs(1))
                .with_retry(RetryPolicy::new(5, Duration::from_millis(1))),
        );
        let flow = flow_with_registry(registry, Call::new("flaky"));
        let out = flow
            .run(Context::new(), "ping".to_string(), &StringInput, &StringOutput)
            .await
            .unwrap();
        assert_eq!(out, "echo:ping");
    }

    #[tokio::test]
    async fn call_against_unregistered_service_fails() {
        let registry = Arc::new(ServiceRegistry::new(Arc::new(EchoConnector::default())));
        let flow = flow_with_registry(registry, Call::new("nope"));
        let err = flow
            .run(Context::new(), "ping".to_string(), &StringInput, &StringOutput)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), flow_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn stream_forwards_chunks_in_arrival_order() {
        let registry = Arc::new(ServiceRegistry::new(Arc::new(EchoConnector::default())));
        registry.register(
            "trtllm",
            ServiceConfig::new("trtllm:50051", Duration::from_secs(1)).streaming(true),
        );
        let flow = flow_with_registry(registry, Stream::new("trtllm"));
        let out = flow
            .run(Context::new(), "abc".to_string(), &StringInput, &StringOutput)
            .await
            .unwrap();
        assert_eq!(out, "echo:abc");
    }
}
