//! The engine: a backend, its configuration, an undo history and a change feed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use caravan_core::{ConflictPolicy, EngineConfig, FileRef, PlanError, RedoError, UndoError};
use caravan_vfs::{FileSystem, LocalFs};
use tokio::sync::broadcast;
use tracing::debug;

use crate::conflict::ConflictResolver;
use crate::executor::{Executor, FailurePolicy};
use crate::operation::{FileOperation, OperationOptions};
use crate::outcome::OperationResult;
use crate::plan::{Planner, TransferMode, TransferPlan};
use crate::progress::{CancelToken, ProgressSink};
use crate::undo::{EntryState, HistoryStep, UndoManager};
use crate::watch::{ChangeFeed, FileChange};

/// Plans, executes and undoes file operations against one backend.
///
/// Safe to share between threads. Operations run on the calling thread;
/// see [`OperationQueue`](crate::OperationQueue) for background execution.
pub struct Engine {
    fs: Arc<dyn FileSystem>,
    config: EngineConfig,
    history: Mutex<UndoManager>,
    changes: ChangeFeed,
}

impl Engine {
    pub fn new(fs: Arc<dyn FileSystem>, config: EngineConfig) -> Self {
        let history =
            UndoManager::new(config.history_depth).with_buffer_size(config.copy_buffer_size);
        Self {
            fs,
            config,
            history: Mutex::new(history),
            changes: ChangeFeed::default(),
        }
    }

    /// Engine over the local disk.
    pub fn local(config: EngineConfig) -> Self {
        let fs = LocalFs::from_config(&config);
        Self::new(Arc::new(fs), config)
    }

    pub fn fs(&self) -> &dyn FileSystem {
        &*self.fs
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    /// Receive every change the engine makes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.changes.subscribe()
    }

    /// Plan `operation` without executing it.
    ///
    /// Takes the conflict handler out of `options`.
    pub fn plan(
        &self,
        operation: &FileOperation,
        options: &mut OperationOptions,
    ) -> Result<TransferPlan, PlanError> {
        let policy = options
            .conflict_policy
            .unwrap_or(self.config.conflict_policy);
        let strict = options
            .strict_directory_conflicts
            .unwrap_or(self.config.strict_directory_conflicts);
        let resolver = ConflictResolver::new(policy, strict, self.config.max_rename_probes)
            .with_handler(options.conflict_handler.take());
        let mut planner = Planner::new(&*self.fs, &self.config, resolver);

        match operation {
            FileOperation::Copy {
                sources,
                destination,
            } => planner.plan(sources, destination, TransferMode::Copy),
            FileOperation::Move {
                sources,
                destination,
            } => planner.plan(sources, destination, TransferMode::Move),
            FileOperation::Delete { targets } => planner.plan_delete(targets),
            FileOperation::Trash { targets } => planner.plan_trash(targets),
            FileOperation::Restore { trash_refs } => planner.plan_restore(trash_refs),
            FileOperation::Rename { source, new_name } => planner.plan_rename(source, new_name),
            FileOperation::Link {
                targets,
                destination,
            } => planner.plan_link(targets, destination),
            FileOperation::CreateFile { location } => planner.plan_create(location, false),
            FileOperation::CreateDirectory { location } => planner.plan_create(location, true),
        }
    }

    /// Execute a plan and add its undo record to the history.
    pub fn execute(
        &self,
        plan: TransferPlan,
        policy: FailurePolicy,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> OperationResult {
        let mut result = Executor::new(&*self.fs, &self.config)
            .with_changes(&self.changes)
            .execute(plan, policy, sink, cancel);

        if let Some(record) = result.undo_record() {
            let id = self.history().push(record.clone());
            debug!(id, "recorded for undo");
            result.undo_id = Some(id);
        }
        result
    }

    /// Plan and execute `operation`.
    pub fn run(
        &self,
        operation: &FileOperation,
        mut options: OperationOptions,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<OperationResult, PlanError> {
        let plan = self.plan(operation, &mut options)?;
        let policy = options
            .failure_policy
            .unwrap_or_else(|| FailurePolicy::default_for(&plan));
        Ok(self.execute(plan, policy, sink, cancel))
    }

    /// Move `sources` into `destination` on the calling thread.
    pub fn move_sync(
        &self,
        sources: &[FileRef],
        destination: &FileRef,
        policy: ConflictPolicy,
        sink: &dyn ProgressSink,
    ) -> Result<OperationResult, PlanError> {
        let operation = FileOperation::move_to(sources.to_vec(), destination.clone());
        let options = OperationOptions::new().with_policy(policy);
        self.run(&operation, options, sink, &CancelToken::new())
    }

    /// Copy `sources` into `destination` on the calling thread.
    pub fn copy_sync(
        &self,
        sources: &[FileRef],
        destination: &FileRef,
        policy: ConflictPolicy,
        sink: &dyn ProgressSink,
    ) -> Result<OperationResult, PlanError> {
        let operation = FileOperation::copy(sources.to_vec(), destination.clone());
        let options = OperationOptions::new().with_policy(policy);
        self.run(&operation, options, sink, &CancelToken::new())
    }

    pub fn delete_sync(
        &self,
        targets: &[FileRef],
        sink: &dyn ProgressSink,
    ) -> Result<OperationResult, PlanError> {
        let operation = FileOperation::delete(targets.to_vec());
        self.run(&operation, OperationOptions::new(), sink, &CancelToken::new())
    }

    pub fn trash_sync(
        &self,
        targets: &[FileRef],
        sink: &dyn ProgressSink,
    ) -> Result<OperationResult, PlanError> {
        let operation = FileOperation::trash(targets.to_vec());
        self.run(&operation, OperationOptions::new(), sink, &CancelToken::new())
    }

    pub fn restore_sync(
        &self,
        trash_refs: &[FileRef],
        sink: &dyn ProgressSink,
    ) -> Result<OperationResult, PlanError> {
        let operation = FileOperation::restore(trash_refs.to_vec());
        self.run(&operation, OperationOptions::new(), sink, &CancelToken::new())
    }

    /// Undo the most recent operation.
    ///
    /// The history is only locked to take the record out and to put it
    /// back; the inversion itself runs unlocked.
    pub fn undo(&self) -> Result<HistoryStep, UndoError> {
        let mut checkout = self.history().checkout_undo()?;
        checkout.apply_undo(&*self.fs, Some(&self.changes))?;
        Ok(self.history().check_in(checkout, EntryState::Undone))
    }

    /// Redo the most recently undone operation.
    pub fn redo(&self) -> Result<HistoryStep, RedoError> {
        let mut checkout = self.history().checkout_redo()?;
        checkout.apply_redo(&*self.fs, Some(&self.changes))?;
        Ok(self.history().check_in(checkout, EntryState::Redone))
    }

    pub fn can_undo(&self) -> bool {
        self.history().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history().can_redo()
    }

    /// What the next undo would do, for menus.
    pub fn undo_description(&self) -> Option<String> {
        self.history().peek_undo().map(|r| r.undo_description())
    }

    /// Description of the operation the next redo would replay.
    pub fn redo_description(&self) -> Option<String> {
        self.history().peek_redo().map(|r| r.description.clone())
    }

    /// Lock the history, recovering from a panic in another holder.
    pub fn history(&self) -> MutexGuard<'_, UndoManager> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("history", &self.history().len())
            .finish_non_exhaustive()
    }
}

/// Move `sources` into `destination` on the local disk with default settings.
pub fn move_sync(
    sources: &[FileRef],
    destination: &FileRef,
    policy: ConflictPolicy,
    sink: &dyn ProgressSink,
) -> Result<OperationResult, PlanError> {
    Engine::local(EngineConfig::default()).move_sync(sources, destination, policy, sink)
}
