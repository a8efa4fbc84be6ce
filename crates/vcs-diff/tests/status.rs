use std::fs;

use bstr::ByteSlice;
use vcs_diff::{diff_head_to_index, diff_index_to_worktree, status, DiffOptions, FileStatus, StatusEntry};
use vcs_index::EntryStatus;
use vcs_repository::Repository;
use vcs_utils::{Signature, Time};

fn sig() -> Signature {
    Signature::new("Test", "test@example.com", Time::new(1_700_000_000, 0))
}

fn write(repo: &Repository, path: &str, content: &str) {
    let full = repo.work_tree().join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

/// A repository with one commit holding `kept.txt`, `edit.txt`,
/// `staged.txt`, `gone.txt` and `old.txt`.
fn repo() -> (tempfile::TempDir, Repository) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    for (path, content) in [
        ("kept.txt", "kept\n"),
        ("edit.txt", "edit\n"),
        ("staged.txt", "staged\n"),
        ("gone.txt", "gone\n"),
        ("old.txt", "a long enough line to be recognised after a move\n"),
    ] {
        write(&repo, path, content);
        repo.add(path).unwrap();
    }
    repo.commit("base", &sig()).unwrap();
    (dir, repo)
}

fn find<'a>(entries: &'a [StatusEntry], path: &str) -> &'a StatusEntry {
    entries
        .iter()
        .find(|e| e.path == path)
        .unwrap_or_else(|| panic!("no status for {path}"))
}

#[test]
fn clean_checkout_reports_nothing() {
    let (_dir, repo) = repo();
    assert!(status(&repo, &DiffOptions::default()).unwrap().is_empty());
    assert!(diff_index_to_worktree(&repo, &DiffOptions::default()).unwrap().is_empty());
    assert!(diff_head_to_index(&repo, &DiffOptions::default()).unwrap().is_empty());
}

#[test]
fn every_kind_of_change() {
    let (_dir, repo) = repo();
    write(&repo, "edit.txt", "edited in place\n");
    write(&repo, "staged.txt", "staged change\n");
    repo.add("staged.txt").unwrap();
    fs::remove_file(repo.work_tree().join("gone.txt")).unwrap();
    write(&repo, "new.txt", "untracked\n");
    write(&repo, "added.txt", "added\n");
    repo.add("added.txt").unwrap();
    fs::rename(repo.work_tree().join("old.txt"), repo.work_tree().join("moved.txt")).unwrap();
    repo.remove("old.txt", true).unwrap();
    repo.add("moved.txt").unwrap();

    let entries = status(&repo, &DiffOptions::default()).unwrap();
    let paths: Vec<&str> = entries.iter().map(|e| e.path.to_str().unwrap()).collect();
    assert_eq!(
        paths,
        vec!["added.txt", "edit.txt", "gone.txt", "moved.txt", "new.txt", "staged.txt"]
    );

    let added = find(&entries, "added.txt");
    assert_eq!((added.staged, added.unstaged), (Some(EntryStatus::Added), None));
    assert!(added.oid.is_some());

    let edit = find(&entries, "edit.txt");
    assert_eq!((edit.staged, edit.unstaged), (None, Some(EntryStatus::Modified)));

    let gone = find(&entries, "gone.txt");
    assert_eq!((gone.staged, gone.unstaged), (None, Some(EntryStatus::Deleted)));

    let moved = find(&entries, "moved.txt");
    assert_eq!(moved.staged, Some(EntryStatus::Renamed));
    assert_eq!(moved.orig_path.as_ref().unwrap(), "old.txt");

    let new = find(&entries, "new.txt");
    assert_eq!((new.staged, new.unstaged), (None, Some(EntryStatus::Untracked)));
    assert!(new.oid.is_none());

    let staged = find(&entries, "staged.txt");
    assert_eq!((staged.staged, staged.unstaged), (Some(EntryStatus::Modified), None));
    assert_eq!(staged.size, Some("staged change\n".len() as u64));
}

#[test]
fn worktree_and_cached_diffs() {
    let (_dir, repo) = repo();
    write(&repo, "edit.txt", "edit\nmore\n");
    write(&repo, "staged.txt", "staged\nnext\n");
    repo.add("staged.txt").unwrap();

    let unstaged = diff_index_to_worktree(&repo, &DiffOptions::default()).unwrap();
    assert_eq!(unstaged.len(), 1);
    assert_eq!(unstaged[0].path(), "edit.txt");
    assert_eq!(unstaged[0].status, FileStatus::Modified);
    assert_eq!(unstaged[0].insertions(), 1);

    let cached = diff_head_to_index(&repo, &DiffOptions::default()).unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].path(), "staged.txt");
}

#[test]
fn rewrite_with_same_content_is_clean() {
    let (_dir, repo) = repo();
    write(&repo, "kept.txt", "kept\n");
    assert!(status(&repo, &DiffOptions::default()).unwrap().is_empty());
}

#[test]
fn same_size_edit_is_detected() {
    let (_dir, repo) = repo();
    // Same length and likely the same mtime second as the indexed copy.
    write(&repo, "kept.txt", "KEPT\n");
    let entries = status(&repo, &DiffOptions::default()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].unstaged, Some(EntryStatus::Modified));
}
