//! Step-by-step execution of plans.

use caravan_core::{EngineConfig, ErrorKind, FileRef, FsError};
use caravan_vfs::transfer::{copy_entry, copy_tree, remove_tree};
use caravan_vfs::{FileSystem, FsResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::outcome::{FailedEntry, OperationResult, StepOutcome};
use crate::plan::{StepKind, TransferPlan, TransferStep};
use crate::progress::{CancelToken, ProgressSink, ProgressUpdate, Throttle};
use crate::undo::{UndoAction, UndoRecord};
use crate::watch::{ChangeFeed, FileChange};

/// What to do with the remaining steps after one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop and leave the remaining steps unattempted.
    Abort,
    /// Record the failure and carry on with independent steps.
    Continue,
}

impl FailurePolicy {
    /// Abort for a single entry, continue for batches.
    pub fn default_for(plan: &TransferPlan) -> Self {
        if plan.sources.len() <= 1 && plan.steps.len() <= 1 {
            Self::Abort
        } else {
            Self::Continue
        }
    }
}

/// Runs the steps of a plan against a backend.
pub struct Executor<'a> {
    fs: &'a dyn FileSystem,
    config: &'a EngineConfig,
    changes: Option<&'a ChangeFeed>,
}

/// Dependencies between steps discovered while running.
#[derive(Debug, Default)]
struct Tracker {
    /// Destination directories that could not be created.
    missing_dirs: Vec<FileRef>,
    /// Entries that stay where they were: failed or skipped removals.
    retained: Vec<FileRef>,
}

impl Tracker {
    fn blocked(&self, step: &TransferStep) -> bool {
        if self
            .missing_dirs
            .iter()
            .any(|dir| step.destination.is_within(dir))
        {
            return true;
        }
        step.kind == StepKind::DeleteEntry
            && self
                .retained
                .iter()
                .any(|kept| kept.is_within(&step.destination))
    }

    fn note_unfinished(&mut self, step: &TransferStep) {
        if step.kind == StepKind::MakeDirectory {
            self.missing_dirs.push(step.destination.clone());
        }
        if let Some(source) = &step.source {
            self.retained.push(source.clone());
        }
        if step.kind == StepKind::DeleteEntry {
            self.retained.push(step.destination.clone());
        }
    }
}

impl<'a> Executor<'a> {
    pub fn new(fs: &'a dyn FileSystem, config: &'a EngineConfig) -> Self {
        Self {
            fs,
            config,
            changes: None,
        }
    }

    /// Publish every change made to `feed`.
    pub fn with_changes(mut self, feed: &'a ChangeFeed) -> Self {
        self.changes = Some(feed);
        self
    }

    /// Run `plan` to completion, cancellation or abort.
    ///
    /// Cancellation is checked before every step. Progress is throttled,
    /// except for the final update which is always delivered.
    pub fn execute(
        &self,
        plan: TransferPlan,
        policy: FailurePolicy,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> OperationResult {
        let total_steps = plan.steps.len();
        let mut result = OperationResult::new(plan.operation, total_steps);
        result.skipped = plan.skipped.len();

        let description = format!(
            "{} {} items",
            plan.operation.past_tense(),
            plan.sources.len().max(1)
        );
        let mut record = UndoRecord::new(plan.operation, description);
        let mut progress = ProgressUpdate::new(plan.operation, total_steps, plan.total_bytes);
        let mut throttle = Throttle::new(self.config.progress_interval());
        let mut tracker = Tracker::default();

        info!(operation = %plan.operation, steps = total_steps, %policy, "executing plan");

        for (index, step) in plan.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(operation = %plan.operation, done = index, "cancelled");
                result.cancelled = true;
                result.not_attempted(total_steps - index);
                break;
            }

            progress.current_item = Some(step.current_item().clone());

            let outcome = if tracker.blocked(step) {
                debug!(step = %step.kind, destination = %step.destination, "skipped, depends on an unfinished step");
                tracker.note_unfinished(step);
                StepOutcome::Skipped
            } else {
                match self.run_step(step, &mut record, &mut result, &mut tracker) {
                    Ok(()) => StepOutcome::Completed,
                    Err(error) => {
                        let kind = classify(step, &error);
                        warn!(step = %step.kind, location = %error.location(), %kind, error = %error, "step failed");
                        result.failed.push(FailedEntry::from_error(kind, &error));
                        tracker.note_unfinished(step);
                        StepOutcome::Failed(kind)
                    }
                }
            };

            if outcome == StepOutcome::Completed {
                result.bytes_processed += step.size_hint;
            }
            result.record(outcome);
            progress.steps_done += 1;
            progress.bytes_done += step.size_hint;
            if throttle.ready() {
                sink.on_progress(&progress);
            }

            if matches!(outcome, StepOutcome::Failed(_)) && policy == FailurePolicy::Abort {
                result.aborted = true;
                result.not_attempted(total_steps - index - 1);
                break;
            }
        }

        progress.finished = true;
        sink.on_progress(&progress);

        info!(operation = %plan.operation, summary = %result.summary(), "plan finished");
        if !record.is_empty() {
            result.undo_record = Some(record);
        }
        result
    }

    fn run_step(
        &self,
        step: &TransferStep,
        record: &mut UndoRecord,
        result: &mut OperationResult,
        tracker: &mut Tracker,
    ) -> FsResult<()> {
        let destination = &step.destination;
        match step.kind {
            StepKind::MakeDirectory => {
                self.retry(|| self.fs.create_directory(destination))?;
                record.push(UndoAction::CreatedDirectory {
                    location: destination.clone(),
                });
                self.publish(FileChange::Created(destination.clone()));
            }
            StepKind::CopyFile => {
                let source = required_source(step)?;
                let meta = self.fs.stat(source)?;
                self.retry(|| {
                    copy_entry(
                        self.fs,
                        source,
                        &meta,
                        destination,
                        step.flags.overwrite,
                        self.config.copy_buffer_size,
                    )
                })?;
                if step.flags.overwrite {
                    record.push(UndoAction::Replaced {
                        location: destination.clone(),
                    });
                }
                record.push(UndoAction::Copied {
                    original: source.clone(),
                    copy: destination.clone(),
                });
                if !meta.is_symlink() {
                    self.preserve(source, destination, result);
                }
                self.publish(FileChange::Created(destination.clone()));
            }
            StepKind::MoveFile => {
                let source = required_source(step)?;
                self.move_entry(step, source, record, result, tracker)?;
            }
            StepKind::DeleteEntry => {
                self.retry(|| self.fs.delete(destination))?;
                let location = destination.clone();
                record.push(if step.flags.cleanup {
                    UndoAction::RemovedDirectory { location }
                } else if step.flags.replaces {
                    UndoAction::Replaced { location }
                } else {
                    UndoAction::Deleted { location }
                });
                self.publish(FileChange::Removed(destination.clone()));
            }
            StepKind::SetMetadata => {
                let source = required_source(step)?;
                self.preserve(source, destination, result);
            }
            StepKind::TrashEntry => {
                let trash = self.retry(|| self.fs.move_to_trash(destination))?;
                debug!(location = %destination, trash = %trash, "trashed");
                record.push(UndoAction::Trashed {
                    original: destination.clone(),
                    trash: trash.clone(),
                });
                self.publish(FileChange::Trashed {
                    original: destination.clone(),
                    trash,
                });
            }
            StepKind::RestoreEntry => {
                let trash = required_source(step)?;
                let original = self.retry(|| self.fs.restore_from_trash(trash))?;
                record.push(UndoAction::Restored {
                    trash: trash.clone(),
                    original: original.clone(),
                });
                self.publish(FileChange::Restored {
                    trash: trash.clone(),
                    original,
                });
            }
            StepKind::CreateLink => {
                let target = required_source(step)?;
                self.retry(|| self.fs.create_symlink(target.path(), destination))?;
                record.push(UndoAction::Linked {
                    target: target.clone(),
                    link: destination.clone(),
                });
                self.publish(FileChange::Created(destination.clone()));
            }
            StepKind::CreateFile => {
                self.retry(|| self.fs.open_write(destination, false).map(drop))?;
                record.push(UndoAction::CreatedFile {
                    location: destination.clone(),
                });
                self.publish(FileChange::Created(destination.clone()));
            }
        }
        Ok(())
    }

    /// Rename when possible, else copy then delete.
    ///
    /// If the copy lands but the original cannot be removed, the step still
    /// counts as done and the entry is reported as partial.
    fn move_entry(
        &self,
        step: &TransferStep,
        source: &FileRef,
        record: &mut UndoRecord,
        result: &mut OperationResult,
        tracker: &mut Tracker,
    ) -> FsResult<()> {
        let destination = &step.destination;
        if step.flags.atomic_rename {
            match self.retry(|| self.fs.rename(source, destination)) {
                Ok(()) => {
                    record.push(UndoAction::Moved {
                        from: source.clone(),
                        to: destination.clone(),
                    });
                    self.publish(FileChange::Moved {
                        from: source.clone(),
                        to: destination.clone(),
                    });
                    return Ok(());
                }
                Err(FsError::CrossesDevices { .. }) => {
                    debug!(source = %source, destination = %destination, "rename crosses devices, copying");
                }
                Err(e) => return Err(e),
            }
        }

        let meta = self.fs.stat(source)?;
        let buffer_size = self.config.copy_buffer_size;
        if meta.is_dir() {
            self.retry(|| copy_tree(self.fs, source, destination, buffer_size))?;
        } else {
            self.retry(|| copy_entry(self.fs, source, &meta, destination, false, buffer_size))?;
            if !meta.is_symlink() {
                self.preserve(source, destination, result);
            }
        }
        self.publish(FileChange::Created(destination.clone()));

        let removed = if meta.is_dir() {
            self.retry(|| remove_tree(self.fs, source))
        } else {
            self.retry(|| self.fs.delete(source))
        };
        match removed {
            Ok(()) => {
                record.push(UndoAction::Moved {
                    from: source.clone(),
                    to: destination.clone(),
                });
                self.publish(FileChange::Removed(source.clone()));
            }
            Err(e) => {
                warn!(source = %source, error = %e, "copied, but original not removed");
                result.partial.push(FailedEntry::from_error(
                    ErrorKind::CrossFilesystemFallbackPartial,
                    &e,
                ));
                record.push(UndoAction::Copied {
                    original: source.clone(),
                    copy: destination.clone(),
                });
                tracker.retained.push(source.clone());
            }
        }
        Ok(())
    }

    /// Copy metadata from `source` onto `dest`; failures are only warnings.
    fn preserve(&self, source: &FileRef, dest: &FileRef, result: &mut OperationResult) {
        if !self.config.preserve_metadata {
            return;
        }
        let applied = self
            .fs
            .stat(source)
            .and_then(|meta| self.fs.set_metadata(dest, &meta));
        if let Err(e) = applied {
            warn!(location = %dest, error = %e, "metadata not preserved");
            result.warnings.push(FailedEntry::from_error(e.kind(), &e));
        }
    }

    /// Run `op`, retrying immediately while it fails transiently.
    fn retry<T>(&self, mut op: impl FnMut() -> FsResult<T>) -> FsResult<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_transient() && attempt < self.config.transient_retries => {
                    attempt += 1;
                    debug!(attempt, error = %e, "retrying after transient error");
                }
                other => return other,
            }
        }
    }

    fn publish(&self, change: FileChange) {
        if let Some(feed) = self.changes {
            feed.publish(change);
        }
    }
}

impl std::fmt::Debug for Executor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn required_source(step: &TransferStep) -> FsResult<&FileRef> {
    step.source.as_ref().ok_or_else(|| {
        FsError::unsupported(step.destination.clone(), format!("{} step without a source", step.kind))
    })
}

/// A missing source means it vanished after planning.
fn classify(step: &TransferStep, error: &FsError) -> ErrorKind {
    match (&step.source, error) {
        (Some(source), FsError::NotFound { location }) if location == source => {
            ErrorKind::SourceVanished
        }
        _ => error.kind(),
    }
}
