mod common;

use caravan_core::{ConflictPolicy, ErrorKind, FileRef, PlanError};
use caravan_ops::{NoProgress, StepKind, StepOutcome};
use common::{Call, FaultKind, Fixture};

fn move_all(fx: &Fixture, sources: &[FileRef], destination: &FileRef) -> caravan_ops::OperationResult {
    fx.engine
        .move_sync(sources, destination, ConflictPolicy::Skip, &NoProgress)
        .unwrap()
}

#[test]
fn test_move_one_file() {
    let fx = Fixture::new();
    let file = fx.file("first_dir/first_dir_child", "");
    let second = fx.dir("second_dir");

    let result = move_all(&fx, &[file.clone()], &second);

    assert!(result.is_success());
    assert!(fx.exists("second_dir/first_dir_child"));
    assert!(!fx.exists("first_dir/first_dir_child"));
}

#[test]
fn test_move_one_empty_directory() {
    let fx = Fixture::new();
    let dir = fx.dir("first_dir/first_dir_child");
    let second = fx.dir("second_dir");

    move_all(&fx, &[dir], &second);

    assert!(fx.exists("second_dir/first_dir_child"));
    assert!(!fx.exists("first_dir/first_dir_child"));
}

fn move_many(count: usize, directories: bool) {
    let fx = Fixture::new();
    let sources: Vec<FileRef> = (0..count)
        .map(|i| {
            let name = format!("file_{i}");
            if directories {
                fx.dir(&name)
            } else {
                fx.file(&name, "x")
            }
        })
        .collect();
    let dir = fx.dir("dir");

    let result = move_all(&fx, &sources, &dir);

    assert!(result.is_success());
    assert_eq!(result.completed, count);
    for i in 0..count {
        assert!(fx.exists(&format!("dir/file_{i}")));
        assert!(!fx.exists(&format!("file_{i}")));
    }
}

#[test]
fn test_move_directories_small() {
    move_many(10, true);
}

#[test]
fn test_move_directories_medium() {
    move_many(1000, true);
}

#[test]
fn test_move_files_small() {
    move_many(10, false);
}

#[test]
fn test_move_files_medium() {
    move_many(1000, false);
}

#[test]
fn test_move_first_hierarchy() {
    let fx = Fixture::new();
    fx.file("first_dir/first_dir_child", "");
    let second = fx.dir("second_dir");

    move_all(&fx, &[fx.path("first_dir")], &second);

    assert_eq!(fx.tree("second_dir"), ["first_dir", "first_dir/first_dir_child"]);
    assert!(!fx.exists("first_dir"));
}

#[test]
fn test_move_second_hierarchy() {
    let fx = Fixture::new();
    fx.file("first_dir/first_child", "");
    fx.file("first_dir/second_child", "");
    let second = fx.dir("second_dir");

    move_all(&fx, &[fx.path("first_dir")], &second);

    assert_eq!(
        fx.tree("second_dir"),
        ["first_dir", "first_dir/first_child", "first_dir/second_child"]
    );
    assert!(!fx.exists("first_dir"));
}

#[test]
fn test_move_third_hierarchy() {
    let fx = Fixture::new();
    fx.file("first_dir/first_child/second_child", "");
    let second = fx.dir("second_dir");

    move_all(&fx, &[fx.path("first_dir")], &second);

    assert_eq!(
        fx.tree("second_dir"),
        [
            "first_dir",
            "first_dir/first_child",
            "first_dir/first_child/second_child"
        ]
    );
    assert!(!fx.exists("first_dir"));
}

#[test]
fn test_move_fourth_hierarchy() {
    let fx = Fixture::new();
    fx.file("first_dir/first_dir_dir1/dir1_child", "");
    fx.file("first_dir/first_dir_dir2/dir2_child", "");
    let second = fx.dir("second_dir");

    move_all(&fx, &[fx.path("first_dir")], &second);

    assert!(fx.exists("second_dir/first_dir/first_dir_dir1/dir1_child"));
    assert!(fx.exists("second_dir/first_dir/first_dir_dir2/dir2_child"));
    assert!(!fx.exists("first_dir"));
}

#[test]
fn test_move_multiple_roots() {
    let fx = Fixture::new();
    let a = fx.file("first_dir/a.txt", "a");
    let b = fx.file("other/b.txt", "b");
    let tree = fx.dir("tree");
    fx.file("tree/nested/c.txt", "c");
    let dest = fx.dir("dest");

    move_all(&fx, &[a, b, tree], &dest);

    assert_eq!(fx.read("dest/a.txt"), "a");
    assert_eq!(fx.read("dest/b.txt"), "b");
    assert_eq!(fx.read("dest/tree/nested/c.txt"), "c");
}

#[test]
fn test_same_volume_directory_is_one_rename() {
    let fx = Fixture::new();
    fx.file("src/one", "1");
    fx.file("src/two", "2");
    let dest = fx.dir("dest");

    let plan = fx
        .engine
        .plan(
            &caravan_ops::FileOperation::move_to(vec![fx.path("src")], dest),
            &mut caravan_ops::OperationOptions::new(),
        )
        .unwrap();

    assert_eq!(plan.len(), 1);
    assert_eq!(plan.steps[0].kind, StepKind::MoveFile);
    assert!(plan.steps[0].flags.atomic_rename);
}

#[test]
fn test_move_into_own_subtree_is_rejected() {
    let fx = Fixture::new();
    let parent = fx.dir("parent");
    let child = fx.dir("parent/child");

    let result = fx
        .engine
        .move_sync(&[parent], &child, ConflictPolicy::Skip, &NoProgress);

    assert!(matches!(result, Err(PlanError::RecursiveMove { .. })));
    assert!(fx.exists("parent/child"));
}

#[test]
fn test_move_onto_itself_is_a_noop() {
    let fx = Fixture::new();
    let file = fx.file("here/file", "x");

    let result = move_all(&fx, &[file], &fx.path("here"));

    assert_eq!(result.total_steps, 0);
    assert_eq!(result.skipped, 1);
    assert_eq!(fx.read("here/file"), "x");
    assert!(result.undo_id.is_none());
}

#[test]
fn test_missing_destination_is_invalid() {
    let fx = Fixture::new();
    let file = fx.file("file", "x");

    let result = fx
        .engine
        .move_sync(&[file], &fx.path("nowhere"), ConflictPolicy::Skip, &NoProgress);

    assert!(matches!(result, Err(PlanError::InvalidDestination { .. })));
}

#[test]
fn test_missing_source_vanished() {
    let fx = Fixture::new();
    let dest = fx.dir("dest");

    let result = fx
        .engine
        .move_sync(&[fx.path("ghost")], &dest, ConflictPolicy::Skip, &NoProgress);

    assert!(matches!(result, Err(PlanError::SourceVanished { .. })));
}

#[test]
fn test_cross_volume_directory_move() {
    let fx = Fixture::new();
    fx.file("src/tree/a", "a");
    fx.file("src/tree/sub/b", "b");
    let far = fx.dir("far");
    fx.fs.split_volume_at(&far);

    let result = move_all(&fx, &[fx.path("src/tree")], &far);

    assert!(result.is_success(), "{:?}", result.failed);
    assert_eq!(fx.tree("far"), ["tree", "tree/a", "tree/sub", "tree/sub/b"]);
    assert!(!fx.exists("src/tree"));
    assert!(fx.exists("src"));
}

#[test]
fn test_cross_volume_delete_failure_is_partial() {
    let fx = Fixture::new();
    let file = fx.file("src/file", "data");
    let far = fx.dir("far");
    fx.fs.split_volume_at(&far);
    fx.fs.fail(Call::Delete, &file, FaultKind::PermissionDenied, 10);

    let result = move_all(&fx, &[file], &far);

    assert_eq!(result.outcomes, [StepOutcome::Completed]);
    assert_eq!(result.partial.len(), 1);
    assert_eq!(result.partial[0].kind, ErrorKind::CrossFilesystemFallbackPartial);
    assert!(!result.is_success());
    assert_eq!(fx.read("far/file"), "data");
    assert_eq!(fx.read("src/file"), "data");
}

#[test]
fn test_cross_volume_skipped_child_keeps_source_directory() {
    let fx = Fixture::new();
    fx.file("src/tree/keep", "new");
    fx.file("src/tree/take", "t");
    let far = fx.dir("far");
    fx.file("far/tree/keep", "old");
    fx.fs.split_volume_at(&far);

    let result = move_all(&fx, &[fx.path("src/tree")], &far);

    assert_eq!(result.skipped, 1);
    assert_eq!(fx.read("far/tree/keep"), "old");
    assert_eq!(fx.read("far/tree/take"), "t");
    assert_eq!(fx.tree("src/tree"), ["keep"]);
}

#[test]
fn test_transient_rename_is_retried() {
    let fx = Fixture::new();
    let file = fx.file("a/file", "x");
    let dest = fx.dir("b");
    fx.fs.fail(Call::Rename, &file, FaultKind::Transient, 1);

    let result = move_all(&fx, &[file.clone()], &dest);

    assert!(result.is_success());
    assert_eq!(fx.fs.count(Call::Rename, &file), 2);
    assert!(fx.exists("b/file"));
}

#[test]
fn test_persistent_transient_error_fails() {
    let fx = Fixture::new();
    let file = fx.file("a/file", "x");
    let dest = fx.dir("b");
    fx.fs.fail(Call::Rename, &file, FaultKind::Transient, 5);

    let result = move_all(&fx, &[file], &dest);

    assert_eq!(result.outcomes, [StepOutcome::Failed(ErrorKind::TransientIo)]);
    assert!(result.aborted);
    assert!(fx.exists("a/file"));
}

#[test]
fn test_failed_fallback_copy_is_retried_from_scratch() {
    let fx = Fixture::new();
    fx.file("src/tree/a", "a");
    fx.file("src/tree/b", "b");
    let far = fx.dir("far");
    fx.fs.split_volume_at(&far);
    fx.fs.report_single_volume();
    fx.fs
        .fail(Call::OpenWrite, &fx.path("far/tree/b"), FaultKind::Transient, 1);

    let mut result = move_all(&fx, &[fx.path("src/tree")], &far);

    assert!(result.is_success(), "{:?}", result.failed);
    assert_eq!(fx.tree("far"), ["tree", "tree/a", "tree/b"]);
    assert!(!fx.exists("src/tree"));
    assert_eq!(fx.fs.count(Call::OpenWrite, &fx.path("far/tree/b")), 2);
    let record = result.take_undo_record().unwrap();
    assert!(matches!(
        &record.actions[..],
        [caravan_ops::UndoAction::Moved { .. }]
    ));
}

#[test]
fn test_failed_fallback_copy_leaves_no_partial_tree() {
    let fx = Fixture::new();
    fx.file("src/tree/a", "a");
    fx.file("src/tree/b", "b");
    let far = fx.dir("far");
    fx.fs.split_volume_at(&far);
    fx.fs.report_single_volume();
    fx.fs.fail(
        Call::OpenWrite,
        &fx.path("far/tree/b"),
        FaultKind::PermissionDenied,
        5,
    );

    let result = move_all(&fx, &[fx.path("src/tree")], &far);

    assert_eq!(
        result.outcomes,
        [StepOutcome::Failed(ErrorKind::PermissionDenied)]
    );
    assert!(fx.tree("far").is_empty());
    assert_eq!(fx.tree("src/tree"), ["a", "b"]);
    assert!(result.undo_id.is_none());
}
