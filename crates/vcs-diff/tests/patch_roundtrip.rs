//! A formatted diff, parsed back and applied to the old content, must
//! reproduce the new content exactly.

use std::fs;

use proptest::prelude::*;
use vcs_diff::{apply, diff_blobs, format_patch, parse_patch, DiffOptions, FileDiff, FileStatus};
use vcs_object::FileMode;

fn file_diff(old: &[u8], new: &[u8], context: u32) -> FileDiff {
    let opts = DiffOptions {
        context_lines: context,
        ..DiffOptions::default()
    };
    FileDiff {
        status: FileStatus::Modified,
        old_path: "f.txt".into(),
        new_path: "f.txt".into(),
        old_mode: Some(FileMode::Regular),
        new_mode: Some(FileMode::Regular),
        old_oid: None,
        new_oid: None,
        hunks: diff_blobs(old, new, &opts),
        is_binary: false,
        similarity: None,
    }
}

fn roundtrip(old: &[u8], new: &[u8], context: u32) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.txt");
    fs::write(&path, old).unwrap();

    let text = format_patch(&[file_diff(old, new, context)]);
    let patch = parse_patch(&text).unwrap();
    assert!(apply(&patch, dir.path(), false).unwrap(), "patch did not apply:\n{text}");
    fs::read(&path).unwrap()
}

fn content() -> impl Strategy<Value = Vec<u8>> {
    (proptest::collection::vec("[abc]{0,3}", 0..30), any::<bool>()).prop_map(|(lines, eol)| {
        let mut text = lines.join("\n");
        if eol && !text.is_empty() {
            text.push('\n');
        }
        text.into_bytes()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn applying_a_diff_reproduces_the_target(old in content(), new in content(), context in 0u32..4) {
        prop_assert_eq!(roundtrip(&old, &new, context), new);
    }
}

#[test]
fn appended_line_is_one_hunk() {
    let diff = file_diff(b"line1\nline2\n", b"line1\nline2\nline3\n", 3);
    assert_eq!(diff.hunks.len(), 1);
    let hunk = &diff.hunks[0];
    assert_eq!((hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count), (1, 2, 1, 3));
    assert_eq!(diff.insertions(), 1);
    assert_eq!(diff.deletions(), 0);
    assert_eq!(roundtrip(b"line1\nline2\n", b"line1\nline2\nline3\n", 3), b"line1\nline2\nline3\n");
}

#[test]
fn missing_final_newline_survives() {
    assert_eq!(roundtrip(b"a\nb", b"a\nb\n", 3), b"a\nb\n");
    assert_eq!(roundtrip(b"a\nb\n", b"a\nc", 3), b"a\nc");
    assert_eq!(roundtrip(b"", b"only", 1), b"only");
}
