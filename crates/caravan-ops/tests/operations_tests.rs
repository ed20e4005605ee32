mod common;

use caravan_core::{ConflictPolicy, FsError, PlanError, TRASH_SCHEME};
use caravan_ops::{CancelToken, FileOperation, NoProgress, OperationKind, OperationOptions, StepKind};
use common::Fixture;

fn run(
    fx: &Fixture,
    operation: FileOperation,
) -> Result<caravan_ops::OperationResult, PlanError> {
    fx.engine.run(
        &operation,
        OperationOptions::new().with_policy(ConflictPolicy::Skip),
        &NoProgress,
        &CancelToken::new(),
    )
}

#[test]
fn test_delete_removes_tree_children_first() {
    let fx = Fixture::new();
    fx.file("tree/a", "a");
    fx.file("tree/sub/b", "b");

    let plan = fx
        .engine
        .plan(
            &FileOperation::delete(vec![fx.path("tree")]),
            &mut OperationOptions::new(),
        )
        .unwrap();
    let order: Vec<_> = plan.steps.iter().map(|s| s.destination.clone()).collect();
    assert_eq!(order.last(), Some(&fx.path("tree")));
    let sub = order.iter().position(|d| *d == fx.path("tree/sub")).unwrap();
    let b = order.iter().position(|d| *d == fx.path("tree/sub/b")).unwrap();
    assert!(b < sub);

    let result = fx.engine.delete_sync(&[fx.path("tree")], &NoProgress).unwrap();
    assert!(result.is_success());
    assert_eq!(result.completed, 4);
    assert!(!fx.exists("tree"));
}

#[test]
fn test_trash_records_trash_reference() {
    let fx = Fixture::new();
    let file = fx.file("junk.txt", "j");

    let mut rx = fx.engine.subscribe();
    let mut result = fx.engine.trash_sync(&[file.clone()], &NoProgress).unwrap();

    assert!(result.is_success());
    assert!(!fx.exists("junk.txt"));
    let record = result.take_undo_record().unwrap();
    match &record.actions[..] {
        [caravan_ops::UndoAction::Trashed { original, trash }] => {
            assert_eq!(original, &file);
            assert_eq!(trash.scheme(), TRASH_SCHEME);
            assert_eq!(
                rx.try_recv().unwrap(),
                caravan_ops::FileChange::Trashed {
                    original: file.clone(),
                    trash: trash.clone(),
                }
            );
        }
        other => panic!("unexpected actions {other:?}"),
    }
}

#[test]
fn test_restore_puts_entry_back() {
    let fx = Fixture::new();
    let file = fx.file("a/junk.txt", "j");
    let mut trashed = fx.engine.trash_sync(&[file], &NoProgress).unwrap();
    let trash = match &trashed.take_undo_record().unwrap().actions[0] {
        caravan_ops::UndoAction::Trashed { trash, .. } => trash.clone(),
        other => panic!("unexpected action {other:?}"),
    };

    let result = fx.engine.restore_sync(&[trash], &NoProgress).unwrap();

    assert!(result.is_success());
    assert_eq!(result.operation, OperationKind::Restore);
    assert_eq!(fx.read("a/junk.txt"), "j");
}

#[test]
fn test_restore_onto_occupied_location_is_skipped() {
    let fx = Fixture::new();
    let file = fx.file("junk.txt", "old");
    let mut trashed = fx.engine.trash_sync(&[file], &NoProgress).unwrap();
    let trash = match &trashed.take_undo_record().unwrap().actions[0] {
        caravan_ops::UndoAction::Trashed { trash, .. } => trash.clone(),
        other => panic!("unexpected action {other:?}"),
    };
    fx.file("junk.txt", "new");

    let result = fx.engine.restore_sync(&[trash.clone()], &NoProgress).unwrap();

    assert_eq!(result.skipped, 1);
    assert_eq!(fx.read("junk.txt"), "new");
    assert!(fx.engine.fs().exists(&trash));
}

#[test]
fn test_rename_in_place() {
    let fx = Fixture::new();
    let file = fx.file("dir/before.txt", "x");

    let result = run(&fx, FileOperation::rename(file, "after.txt")).unwrap();

    assert!(result.is_success());
    assert_eq!(fx.tree("dir"), ["after.txt"]);
}

#[test]
fn test_rename_to_same_name_does_nothing() {
    let fx = Fixture::new();
    let file = fx.file("same", "x");

    let result = run(&fx, FileOperation::rename(file, "same")).unwrap();

    assert_eq!(result.total_steps, 0);
    assert!(result.undo_id.is_none());
}

#[test]
fn test_rename_rejects_bad_names_and_taken_names() {
    let fx = Fixture::new();
    let file = fx.file("a", "x");
    fx.file("b", "y");

    for bad in ["", "x/y", ".", ".."] {
        let result = run(&fx, FileOperation::rename(file.clone(), bad));
        assert!(matches!(result, Err(PlanError::InvalidName { .. })), "{bad:?}");
    }

    let result = run(&fx, FileOperation::rename(file, "b"));
    assert!(matches!(
        result,
        Err(PlanError::Fs(FsError::AlreadyExists { .. }))
    ));
    assert_eq!(fx.read("b"), "y");
}

#[cfg(unix)]
#[test]
fn test_link_creates_symlinks() {
    let fx = Fixture::new();
    let target = fx.file("data/report", "r");
    let links = fx.dir("links");

    let result = run(&fx, FileOperation::link(vec![target.clone()], links)).unwrap();

    assert!(result.is_success());
    let link = std::fs::read_link(fx.path("links/report").path()).unwrap();
    assert_eq!(link, target.path());
}

#[cfg(unix)]
#[test]
fn test_link_in_same_directory_gets_prefixed_name() {
    let fx = Fixture::new();
    let target = fx.file("data/report", "r");

    run(&fx, FileOperation::link(vec![target], fx.path("data"))).unwrap();

    assert_eq!(fx.tree("data"), ["Link to report", "report"]);
}

#[cfg(unix)]
#[test]
fn test_link_conflict_is_skipped() {
    let fx = Fixture::new();
    let target = fx.file("data/report", "r");
    fx.file("links/report", "already here");

    let result = run(&fx, FileOperation::link(vec![target], fx.path("links"))).unwrap();

    assert_eq!(result.skipped, 1);
    assert_eq!(fx.read("links/report"), "already here");
}

#[test]
fn test_create_file_and_directory() {
    let fx = Fixture::new();

    let made = run(&fx, FileOperation::create_directory(fx.path("new dir"))).unwrap();
    let touched = run(&fx, FileOperation::create_file(fx.path("new dir/empty.txt"))).unwrap();

    assert_eq!(made.operation, OperationKind::CreateDirectory);
    assert_eq!(touched.operation, OperationKind::CreateFile);
    assert_eq!(fx.read("new dir/empty.txt"), "");
}

#[test]
fn test_create_refuses_existing_and_missing_parent() {
    let fx = Fixture::new();
    fx.file("taken", "x");

    let exists = run(&fx, FileOperation::create_file(fx.path("taken")));
    assert!(matches!(exists, Err(PlanError::Fs(FsError::AlreadyExists { .. }))));

    let orphan = run(&fx, FileOperation::create_directory(fx.path("missing/child")));
    assert!(matches!(orphan, Err(PlanError::InvalidDestination { .. })));
}

#[test]
fn test_plan_is_side_effect_free() {
    let fx = Fixture::new();
    fx.file("src/a", "a");
    let dest = fx.dir("dest");

    let plan = fx
        .engine
        .plan(
            &FileOperation::copy(vec![fx.path("src")], dest),
            &mut OperationOptions::new(),
        )
        .unwrap();

    assert_eq!(plan.steps[0].kind, StepKind::MakeDirectory);
    assert!(fx.tree("dest").is_empty());
    assert!(!fx.engine.can_undo());
}
