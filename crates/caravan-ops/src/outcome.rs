//! Results of executed plans.

use caravan_core::{ErrorKind, FileRef, FsError};
use serde::Serialize;

use crate::operation::OperationKind;
use crate::undo::UndoRecord;

/// What happened to one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "kind")]
pub enum StepOutcome {
    Completed,
    Skipped,
    Failed(ErrorKind),
    /// Never reached because of cancellation or abort.
    NotAttempted,
}

/// An entry that failed, or only partly succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub location: FileRef,
    pub kind: ErrorKind,
    pub message: String,
}

impl FailedEntry {
    pub fn new(location: FileRef, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            location,
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn from_error(kind: ErrorKind, error: &FsError) -> Self {
        Self::new(error.location().clone(), kind, error.to_string())
    }
}

/// Summary of an executed plan.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub operation: OperationKind,
    pub total_steps: usize,
    pub completed: usize,
    /// Skipped steps plus entries dropped while planning.
    pub skipped: usize,
    /// Outcome of each step, in plan order.
    pub outcomes: Vec<StepOutcome>,
    pub failed: Vec<FailedEntry>,
    /// Entries copied across filesystems whose originals could not be removed.
    pub partial: Vec<FailedEntry>,
    /// Non-fatal problems, such as metadata that could not be preserved.
    pub warnings: Vec<FailedEntry>,
    pub cancelled: bool,
    /// Stopped by the failure policy after a failed step.
    pub aborted: bool,
    pub bytes_processed: u64,
    /// History id of the record pushed for this operation, if any.
    pub undo_id: Option<u64>,
    #[serde(skip)]
    pub(crate) undo_record: Option<UndoRecord>,
}

impl OperationResult {
    pub(crate) fn new(operation: OperationKind, total_steps: usize) -> Self {
        Self {
            operation,
            total_steps,
            completed: 0,
            skipped: 0,
            outcomes: Vec::with_capacity(total_steps),
            failed: Vec::new(),
            partial: Vec::new(),
            warnings: Vec::new(),
            cancelled: false,
            aborted: false,
            bytes_processed: 0,
            undo_id: None,
            undo_record: None,
        }
    }

    /// Check if every step completed and nothing was left behind.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.partial.is_empty() && !self.cancelled && !self.aborted
    }

    /// Undo record built while executing, if not yet handed to the history.
    pub fn take_undo_record(&mut self) -> Option<UndoRecord> {
        self.undo_record.take()
    }

    pub fn undo_record(&self) -> Option<&UndoRecord> {
        self.undo_record.as_ref()
    }

    /// Get a human-readable summary of the operation.
    pub fn summary(&self) -> String {
        let action = self.operation.past_tense();
        let mut summary = format!("{action} {} items", self.completed);
        if self.skipped > 0 {
            summary.push_str(&format!(", {} skipped", self.skipped));
        }
        if !self.failed.is_empty() {
            summary.push_str(&format!(", {} failed", self.failed.len()));
        }
        if !self.partial.is_empty() {
            summary.push_str(&format!(", {} not removed from source", self.partial.len()));
        }
        if self.cancelled {
            summary.push_str(" (cancelled)");
        } else if self.aborted {
            summary.push_str(" (aborted)");
        }
        summary
    }

    pub(crate) fn record(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Completed => self.completed += 1,
            StepOutcome::Skipped => self.skipped += 1,
            StepOutcome::Failed(_) | StepOutcome::NotAttempted => {}
        }
        self.outcomes.push(outcome);
    }

    pub(crate) fn not_attempted(&mut self, count: usize) {
        self.outcomes
            .extend(std::iter::repeat_n(StepOutcome::NotAttempted, count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let mut result = OperationResult::new(OperationKind::Move, 3);
        result.record(StepOutcome::Completed);
        result.record(StepOutcome::Completed);
        result.record(StepOutcome::Failed(ErrorKind::PermissionDenied));
        result.failed.push(FailedEntry::new(
            FileRef::local("/x"),
            ErrorKind::PermissionDenied,
            "permission denied",
        ));
        assert_eq!(result.summary(), "Moved 2 items, 1 failed");
        assert!(!result.is_success());
    }

    #[test]
    fn test_not_attempted_fills_outcomes() {
        let mut result = OperationResult::new(OperationKind::Copy, 4);
        result.record(StepOutcome::Completed);
        result.not_attempted(3);
        assert_eq!(result.outcomes.len(), 4);
        assert_eq!(result.outcomes[3], StepOutcome::NotAttempted);
    }
}
