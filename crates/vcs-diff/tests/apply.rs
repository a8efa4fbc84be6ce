use std::fs;
use std::path::Path;

use vcs_diff::{apply, apply_with, parse_patch, ApplyOptions, ContextPolicy, DiffError};
use vcs_utils::ErrorKind;

const EDIT: &str = "diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1,3 +1,3 @@
 one
-two
+TWO
 three
";

const ADD: &str = "diff --git a/dir/new.txt b/dir/new.txt
new file mode 100644
--- /dev/null
+++ b/dir/new.txt
@@ -0,0 +1,2 @@
+hello
+world
";

const DELETE: &str = "diff --git a/gone.txt b/gone.txt
deleted file mode 100644
--- a/gone.txt
+++ /dev/null
@@ -1 +0,0 @@
-bye
";

const RENAME: &str = "diff --git a/old.txt b/sub/moved.txt
similarity index 100%
rename from old.txt
rename to sub/moved.txt
";

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
    fs::write(dir.path().join("gone.txt"), "bye\n").unwrap();
    fs::write(dir.path().join("old.txt"), "moving\n").unwrap();
    dir
}

fn read(dir: &Path, path: &str) -> String {
    fs::read_to_string(dir.join(path)).unwrap()
}

#[test]
fn edits_adds_deletes_and_renames() {
    let dir = setup();
    let text = [EDIT, ADD, DELETE, RENAME].concat();
    let patch = parse_patch(&text).unwrap();
    let touched = apply_with(&patch, dir.path(), &ApplyOptions::default()).unwrap();

    assert_eq!(read(dir.path(), "a.txt"), "one\nTWO\nthree\n");
    assert_eq!(read(dir.path(), "dir/new.txt"), "hello\nworld\n");
    assert!(!dir.path().join("gone.txt").exists());
    assert!(!dir.path().join("old.txt").exists());
    assert_eq!(read(dir.path(), "sub/moved.txt"), "moving\n");
    assert_eq!(touched.len(), 5);
}

#[test]
fn conflict_leaves_every_file_untouched() {
    let dir = setup();
    fs::write(dir.path().join("b.txt"), "x\ny\n").unwrap();
    let bad = "diff --git a/b.txt b/b.txt
--- a/b.txt
+++ b/b.txt
@@ -1,2 +1,2 @@
 x
-not here
+z
";
    let patch = parse_patch([EDIT, ADD, bad].concat()).unwrap();
    assert!(!apply(&patch, dir.path(), false).unwrap());

    assert_eq!(read(dir.path(), "a.txt"), "one\ntwo\nthree\n");
    assert_eq!(read(dir.path(), "b.txt"), "x\ny\n");
    assert!(!dir.path().join("dir").exists());

    let err = apply_with(&patch, dir.path(), &ApplyOptions::default()).unwrap_err();
    assert!(matches!(err, DiffError::PatchConflict { hunk: 1, .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn dry_run_reports_without_writing() {
    let dir = setup();
    let patch = parse_patch([EDIT, ADD, DELETE].concat()).unwrap();
    assert!(apply(&patch, dir.path(), true).unwrap());
    assert_eq!(read(dir.path(), "a.txt"), "one\ntwo\nthree\n");
    assert!(dir.path().join("gone.txt").exists());
    assert!(!dir.path().join("dir").exists());
}

#[test]
fn add_over_existing_file_is_refused() {
    let dir = setup();
    fs::create_dir(dir.path().join("dir")).unwrap();
    fs::write(dir.path().join("dir/new.txt"), "already\n").unwrap();
    let err = apply_with(&parse_patch(ADD).unwrap(), dir.path(), &ApplyOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn missing_target_and_unsafe_paths() {
    let dir = tempfile::tempdir().unwrap();
    let err = apply_with(&parse_patch(EDIT).unwrap(), dir.path(), &ApplyOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let escape = EDIT.replace("a.txt", "../a.txt");
    let err = apply_with(&parse_patch(escape).unwrap(), dir.path(), &ApplyOptions::default()).unwrap_err();
    assert!(matches!(err, DiffError::UnsafePath(_)));
}

#[test]
fn deleting_a_file_that_grew_conflicts() {
    let dir = setup();
    fs::write(dir.path().join("gone.txt"), "bye\nstill here\n").unwrap();
    assert!(!apply(&parse_patch(DELETE).unwrap(), dir.path(), false).unwrap());
    assert!(dir.path().join("gone.txt").exists());
}

#[test]
fn drifted_hunk_needs_offset_allowance() {
    let dir = setup();
    fs::write(dir.path().join("a.txt"), "zero\none\ntwo\nthree\n").unwrap();
    let patch = parse_patch(EDIT).unwrap();
    assert!(!apply(&patch, dir.path(), false).unwrap());

    let opts = ApplyOptions {
        max_offset: 2,
        ..ApplyOptions::default()
    };
    apply_with(&patch, dir.path(), &opts).unwrap();
    assert_eq!(read(dir.path(), "a.txt"), "zero\none\nTWO\nthree\n");
}

#[test]
fn whitespace_insensitive_context() {
    let dir = setup();
    fs::write(dir.path().join("a.txt"), "one  \ntwo\n\tthree\n").unwrap();
    let patch = parse_patch(EDIT).unwrap();
    assert!(!apply(&patch, dir.path(), false).unwrap());

    let opts = ApplyOptions {
        policy: ContextPolicy::IgnoreWhitespace,
        ..ApplyOptions::default()
    };
    apply_with(&patch, dir.path(), &opts).unwrap();
    assert_eq!(read(dir.path(), "a.txt"), "one  \nTWO\n\tthree\n");
}
