//! Optional per-stage instrumentation hook for the `Flow` composer.
//!
//! A small trait the host application can implement to export counters
//! without the runtime depending on any specific metrics backend.

use std::time::Duration;

/// Outcome of one handler task as observed by the `Flow` composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Ok,
    Err,
    Cancelled,
}

/// Callback invoked once per handler task, after it completes. Not part
/// of the core pipeline contract; purely an ambient observability seam,
/// analogous to the `debug!(stage = %stage_name, ...)` instrumentation
/// the flow composer itself emits.
pub trait FlowMetrics: Send + Sync {
    fn record_stage(&self, stage_name: &str, duration: Duration, outcome: StageOutcome);
}

/// No-op implementation used when the caller does not install a recorder.
#[derive(Default)]
pub struct NoopMetrics;

impl FlowMetrics for NoopMetrics {
    fn record_stage(&self, _stage_name: &str, _duration: Duration, _outcome: StageOutcome) {}
}
