//! The process-wide Service Registry: maps service-name to `{ endpoint,
//! connection (lazily established), streaming-flag, timeout, retry
//! policy }`. A registration handler installs the registry into the
//! `Context` so downstream `Call`/`Stream` handlers can look it up
//! without it being threaded through every function signature.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::OnceCell;

use flow_core::{Context, FlowResult, Handler, Request, Response};

use crate::error::{RemoteError, RemoteResult};
use crate::transport::{GrpcConnector, GrpcTransport};

/// Backoff/attempt budget for `Call`'s retry loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

/// Static configuration for one registered service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub streaming: bool,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ServiceConfig {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            streaming: false,
            timeout,
            retry: RetryPolicy::default(),
        }
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// One registry entry: the static config plus its lazily-established
/// connection. `OnceCell` gives a lock-free connect-once-then-reuse
/// pattern for gRPC client handles.
struct ServiceEntry {
    config: ServiceConfig,
    connection: OnceCell<Arc<dyn GrpcTransport>>,
}

/// Process-wide registry: `service-name -> ServiceEntry`. Cheap to clone
/// (the map itself is `Arc`-wrapped internally via `DashMap`'s sharded
/// locking), installed once into the root `Context` and shared by every
/// `Call`/`Stream` handler that runs under it.
pub struct ServiceRegistry {
    connector: Arc<dyn GrpcConnector>,
    services: DashMap<String, Arc<ServiceEntry>>,
}

impl ServiceRegistry {
    pub fn new(connector: Arc<dyn GrpcConnector>) -> Self {
        Self {
            connector,
            services: DashMap::new(),
        }
    }

    /// Register (or replace) a service's static configuration. Does not
    /// connect; the connection is established lazily, on first
    /// `Call`/`Stream` use.
    pub fn register(&self, name: impl Into<String>, config: ServiceConfig) {
        self.services.insert(
            name.into(),
            Arc::new(ServiceEntry {
                config,
                connection: OnceCell::new(),
            }),
        );
    }

    pub fn config(&self, name: &str) -> RemoteResult<ServiceConfig> {
        self.services
            .get(name)
            .map(|e| e.config.clone())
            .ok_or_else(|| RemoteError::UnknownService(name.to_string()))
    }

    /// Resolve the (lazily-established) connection for a registered
    /// service, sharing it across every concurrent caller that resolves
    /// the same name.
    pub async fn connection(&self, name: &str) -> RemoteResult<Arc<dyn GrpcTransport>> {
        let entry = self
            .services
            .get(name)
            .map(|e| e.clone())
            .ok_or_else(|| RemoteError::UnknownService(name.to_string()))?;
        let endpoint = entry.config.endpoint.clone();
        entry
            .connection
            .get_or_try_init(|| async { self.connector.connect(&endpoint).await })
            .await
            .cloned()
    }
}

/// Installs a `ServiceRegistry` into the request `Context`, then forwards
/// `Request.Data` to `Response.Data` unchanged. Used as an ordinary `Flow`
/// stage ahead of any `Call`/`Stream` stage so the registry does not need
/// to be threaded through every handler constructor.
pub struct InstallRegistry {
    registry: Arc<ServiceRegistry>,
}

impl InstallRegistry {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Handler for InstallRegistry {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        request.context.insert(self.registry.clone());
        let Request { mut data, .. } = request;
        while let Some(chunk) = data.read().await? {
            response.data.write(chunk).await?;
        }
        response.data.close();
        Ok(())
    }

    fn name(&self) -> &str {
        "InstallRegistry"
    }
}

/// Look up the registry installed into `context` by `InstallRegistry`.
pub(crate) fn registry_from_context(context: &Context) -> FlowResult<Arc<ServiceRegistry>> {
    context
        .get::<ServiceRegistry>()
        .ok_or_else(|| flow_core::FlowError::internal("no ServiceRegistry installed in context"))
}
