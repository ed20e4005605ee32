//! Background execution of operations with progress over channels.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use caravan_core::{PlanError, RedoError, UndoError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::OPERATION_CHANNEL_SIZE;
use crate::engine::Engine;
use crate::operation::{FileOperation, OperationOptions};
use crate::outcome::OperationResult;
use crate::progress::{CancelToken, ProgressSink, ProgressUpdate};
use crate::undo::HistoryStep;

/// Message sent from a running operation to its submitter.
#[derive(Debug)]
pub enum OperationEvent {
    Progress(ProgressUpdate),
    /// The operation ran; individual steps may still have failed.
    Complete(OperationResult),
    /// Planning rejected the operation. Nothing was changed.
    Failed(PlanError),
}

/// Errors from the queue itself, or from undo/redo run through it.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("operation queue has shut down")]
    Closed,

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Undo(#[from] UndoError),

    #[error(transparent)]
    Redo(#[from] RedoError),
}

/// A submitted operation.
#[derive(Debug)]
pub struct OperationHandle {
    pub id: u64,
    /// Progress followed by exactly one `Complete` or `Failed`. Must be
    /// drained (or dropped) for the queue to move on.
    pub events: mpsc::Receiver<OperationEvent>,
    cancel: CancelToken,
}

impl OperationHandle {
    /// Ask the operation to stop before its next step.
    pub fn cancel(&self) {
        self.cancel.request_cancel();
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Wait for the final event, dropping progress updates.
    pub async fn finish(mut self) -> Result<OperationResult, QueueError> {
        while let Some(event) = self.events.recv().await {
            match event {
                OperationEvent::Progress(_) => {}
                OperationEvent::Complete(result) => return Ok(result),
                OperationEvent::Failed(e) => {
                    debug!(id = self.id, error = %e, "operation rejected");
                    return Err(e.into());
                }
            }
        }
        Err(QueueError::Closed)
    }
}

enum Job {
    Run {
        id: u64,
        operation: FileOperation,
        options: OperationOptions,
        events: mpsc::Sender<OperationEvent>,
        cancel: CancelToken,
    },
    Undo(oneshot::Sender<Result<HistoryStep, UndoError>>),
    Redo(oneshot::Sender<Result<HistoryStep, RedoError>>),
}

/// Runs operations one at a time on a background task.
///
/// Operations execute in submission order on the blocking thread pool, so
/// a long copy never stalls the async runtime. Undo and redo are queued
/// behind running operations.
#[derive(Debug, Clone)]
pub struct OperationQueue {
    jobs: mpsc::UnboundedSender<Job>,
    next_id: Arc<AtomicU64>,
}

impl OperationQueue {
    /// Start the queue's worker task. Must be called within a Tokio runtime.
    pub fn new(engine: Arc<Engine>) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker(engine, rx));
        Self {
            jobs,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Queue `operation` and return a handle to follow it.
    pub fn submit(&self, operation: FileOperation, options: OperationOptions) -> OperationHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, events) = mpsc::channel(OPERATION_CHANNEL_SIZE);
        let cancel = CancelToken::new();

        let job = Job::Run {
            id,
            operation,
            options,
            events: tx,
            cancel: cancel.clone(),
        };
        if self.jobs.send(job).is_err() {
            error!(id, "operation queue has shut down");
        }

        OperationHandle { id, events, cancel }
    }

    pub async fn undo(&self) -> Result<HistoryStep, QueueError> {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(Job::Undo(tx))
            .map_err(|_| QueueError::Closed)?;
        Ok(rx.await.map_err(|_| QueueError::Closed)??)
    }

    pub async fn redo(&self) -> Result<HistoryStep, QueueError> {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(Job::Redo(tx))
            .map_err(|_| QueueError::Closed)?;
        Ok(rx.await.map_err(|_| QueueError::Closed)??)
    }
}

async fn worker(engine: Arc<Engine>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        let engine = Arc::clone(&engine);
        match job {
            Job::Run {
                id,
                operation,
                options,
                events,
                cancel,
            } => {
                debug!(id, kind = %operation.kind(), "starting queued operation");
                let sink = ChannelSink {
                    tx: events.clone(),
                };
                let joined = tokio::task::spawn_blocking(move || {
                    engine.run(&operation, options, &sink, &cancel)
                })
                .await;

                let event = match joined {
                    Ok(Ok(result)) => OperationEvent::Complete(result),
                    Ok(Err(e)) => OperationEvent::Failed(e),
                    Err(e) => {
                        error!(id, error = %e, "operation task panicked");
                        continue;
                    }
                };
                // The submitter may have dropped the handle.
                let _ = events.send(event).await;
            }
            Job::Undo(reply) => {
                match tokio::task::spawn_blocking(move || engine.undo()).await {
                    Ok(result) => {
                        let _ = reply.send(result);
                    }
                    Err(e) => error!(error = %e, "undo task panicked"),
                }
            }
            Job::Redo(reply) => {
                match tokio::task::spawn_blocking(move || engine.redo()).await {
                    Ok(result) => {
                        let _ = reply.send(result);
                    }
                    Err(e) => error!(error = %e, "redo task panicked"),
                }
            }
        }
    }
    debug!("operation queue stopped");
}

/// Forwards progress into an operation's event channel.
struct ChannelSink {
    tx: mpsc::Sender<OperationEvent>,
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, update: &ProgressUpdate) {
        let event = OperationEvent::Progress(update.clone());
        if update.finished {
            // Runs on the blocking pool, so waiting for room is fine.
            let _ = self.tx.blocking_send(event);
        } else {
            // A slow receiver misses intermediate updates.
            let _ = self.tx.try_send(event);
        }
    }
}
