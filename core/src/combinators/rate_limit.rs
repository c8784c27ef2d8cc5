//! `RateLimit`: acquires one permit from a shared limiter before
//! forwarding input unchanged.
//!
//! Policy: a **fixed-window counter** — a periodic reset task driven by
//! `tokio::time::interval`, paired with a counter guarded by
//! `parking_lot::Mutex`. Up to `permits_per_window` calls are admitted per
//! window; a full burst is allowed right at every window boundary. This is
//! a deliberate simplicity-over-precision choice, documented here rather
//! than picked silently.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tracing::debug;

use crate::error::{FlowError, FlowResult};
use crate::handler::{BoxHandler, Handler, Request, Response};

struct Window {
    permits_per_window: usize,
    count: Mutex<usize>,
    notify: Notify,
}

impl Window {
    /// Try to claim a permit in the current window. Returns `true` if
    /// admitted.
    fn try_acquire(&self) -> bool {
        let mut count = self.count.lock();
        if *count < self.permits_per_window {
            *count += 1;
            true
        } else {
            false
        }
    }

    fn reset(&self) {
        *self.count.lock() = 0;
        self.notify.notify_waiters();
        debug!(permits = self.permits_per_window, "rate limit window reset");
    }
}

/// Shared limiter state plus the handle that stops its background reset
/// task when the last clone is dropped, via a reset-task / shutdown-watch
/// pairing.
struct LimiterHandle {
    window: Arc<Window>,
    _shutdown: watch::Sender<bool>,
}

fn spawn_reset_task(window: Arc<Window>, period: Duration) -> watch::Sender<bool> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // first tick fires immediately; don't reset before anyone acquires
        loop {
            tokio::select! {
                _ = ticker.tick() => window.reset(),
                _ = shutdown_rx.changed() => break,
            }
        }
    });
    shutdown_tx
}

/// A handler that rate-limits forwarding of its input using a shared,
/// fixed-window token count. Limiter state is shared across all
/// concurrent invocations of the same `RateLimit` instance.
pub struct RateLimit {
    inner: BoxHandler,
    limiter: Arc<LimiterHandle>,
    permits_per_window: usize,
    window_duration: Duration,
    name: String,
}

impl RateLimit {
    pub fn new(inner: impl Handler + 'static, permits_per_window: usize, window_duration: Duration) -> Self {
        let window = Arc::new(Window {
            permits_per_window,
            count: Mutex::new(0),
            notify: Notify::new(),
        });
        let shutdown = spawn_reset_task(window.clone(), window_duration);
        Self {
            inner: Arc::new(inner),
            limiter: Arc::new(LimiterHandle {
                window,
                _shutdown: shutdown,
            }),
            permits_per_window,
            window_duration,
            name: format!("RateLimit({permits_per_window}/{window_duration:?})"),
        }
    }
}

impl RateLimit {
    pub fn permits_per_window(&self) -> usize {
        self.permits_per_window
    }

    pub fn window_duration(&self) -> Duration {
        self.window_duration
    }
}

#[async_trait]
impl Handler for RateLimit {
    async fn serve_flow(&self, request: Request, response: Response) -> FlowResult<()> {
        let window = &self.limiter.window;
        loop {
            if window.try_acquire() {
                break;
            }
            debug!(permits = self.permits_per_window, "no permit available, waiting");
            tokio::select! {
                _ = window.notify.notified() => {}
                _ = request.context.cancelled() => {
                    return Err(request
                        .context
                        .cancellation_error("cancelled while waiting for a rate-limit permit"));
                }
            }
        }
        self.inner.serve_flow(request, response).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
