//! Progress reporting and cancellation.

use std::time::{Duration, Instant};

use caravan_core::FileRef;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::operation::OperationKind;

/// Snapshot of an operation in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    /// The type of operation.
    pub operation: OperationKind,
    /// Weighted bytes of the steps processed so far.
    pub bytes_done: u64,
    /// Weighted bytes of the whole plan.
    pub bytes_total: u64,
    /// Number of steps processed.
    pub steps_done: usize,
    /// Number of steps in the plan.
    pub steps_total: usize,
    /// The entry currently being processed.
    pub current_item: Option<FileRef>,
    /// Set on the last update of the operation.
    pub finished: bool,
}

impl ProgressUpdate {
    pub fn new(operation: OperationKind, steps_total: usize, bytes_total: u64) -> Self {
        Self {
            operation,
            bytes_done: 0,
            bytes_total,
            steps_done: 0,
            steps_total,
            current_item: None,
            finished: false,
        }
    }

    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.bytes_total > 0 {
            (self.bytes_done as f64 / self.bytes_total as f64) * 100.0
        } else if self.steps_total > 0 {
            (self.steps_done as f64 / self.steps_total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Receiver of progress updates.
///
/// Called from the executing thread, so implementations should return quickly.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: &ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    fn on_progress(&self, update: &ProgressUpdate) {
        self(update)
    }
}

/// Sink that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _update: &ProgressUpdate) {}
}

/// Cooperative cancellation flag shared between a caller and an operation.
///
/// Cancellation is observed between steps; a step already running finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }
}

/// Rate limiter for progress emission.
#[derive(Debug)]
pub(crate) struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True when an update may be emitted now.
    pub(crate) fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
