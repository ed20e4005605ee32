//! File operations engine for caravan.
//!
//! Every operation is planned into a flat list of steps before anything on
//! disk changes. Plans are executed synchronously by the [`Executor`], or in
//! the background through an [`OperationQueue`] that reports progress over
//! channels. Each executed plan leaves an [`UndoRecord`] in the engine's
//! history.

mod conflict;
mod engine;
mod executor;
mod naming;
mod operation;
mod outcome;
mod plan;
mod progress;
mod queue;
mod undo;
mod watch;

pub use conflict::{Conflict, ConflictDecision, ConflictHandler, ConflictResolver};
pub use engine::{Engine, move_sync};
pub use executor::{Executor, FailurePolicy};
pub use naming::{MAX_NAME_LEN, duplicate_name, numbered_name, shorten_base, validate_filename};
pub use operation::{FileOperation, OperationKind, OperationOptions};
pub use outcome::{FailedEntry, OperationResult, StepOutcome};
pub use plan::{Planner, StepFlags, StepKind, TransferMode, TransferPlan, TransferStep};
pub use progress::{CancelToken, NoProgress, ProgressSink, ProgressUpdate};
pub use queue::{OperationEvent, OperationHandle, OperationQueue, QueueError};
pub use undo::{EntryState, HistoryStep, UndoAction, UndoManager, UndoRecord};
pub use watch::{ChangeFeed, FileChange};

/// Default channel buffer size for operation progress updates.
pub const OPERATION_CHANNEL_SIZE: usize = 100;
