mod common;

use bstr::BStr;
use common::*;
use vcs_index::Stage;
use vcs_index::{build_tree, TreeItem};
use vcs_merge::{merge, merge_abort, ConflictKind, MergeError, MergeOptions, MergeOutcome};
use vcs_object::{Commit, FileMode, Object};
use vcs_repository::{PathMap, Repository};
use vcs_utils::ErrorKind;

/// `main` and `topic` forked from a commit holding `f` = [`NUMBERS`].
fn forked() -> (tempfile::TempDir, Repository) {
    let (dir, repo) = repo();
    commit_file(&repo, "f", NUMBERS, "base");
    repo.create_branch("topic", None).unwrap();
    (dir, repo)
}

fn on_topic(repo: &Repository, path: &str, content: &str, msg: &str) {
    repo.checkout("topic").unwrap();
    commit_file(repo, path, content, msg);
    repo.checkout("main").unwrap();
}

#[test]
fn same_line_changed_on_both_sides() {
    let (_dir, repo) = forked();
    on_topic(&repo, "f", &NUMBERS.replace("two", "TWO (topic)"), "topic edit");
    let main_tip = commit_file(&repo, "f", &NUMBERS.replace("two", "TWO (main)"), "main edit");

    let outcome = merge(&repo, "topic", &MergeOptions::default()).unwrap();
    let MergeOutcome::Conflicted { conflicts } = outcome else {
        panic!("expected conflicts, got {outcome:?}");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].path, "f");
    assert_eq!(conflicts[0].kind, ConflictKind::Content);

    // Nothing committed, merge state recorded.
    assert_eq!(head(&repo), main_tip);
    assert!(repo.merge_head().unwrap().is_some());
    let msg = std::fs::read_to_string(repo.merge_msg_path()).unwrap();
    assert!(msg.contains("#\tf"));

    let index = repo.index().unwrap();
    let stages: Vec<Stage> = index.stages(BStr::new("f")).iter().map(|e| e.stage).collect();
    assert_eq!(stages, [Stage::Base, Stage::Ours, Stage::Theirs]);

    let text = read(&repo, "f");
    assert!(text.contains("<<<<<<< HEAD\nTWO (main)\n=======\nTWO (topic)\n>>>>>>> topic\n"));
    assert!(text.starts_with("one\n"));
    assert!(text.ends_with("ten\n"));

    // Committing is refused until the path is resolved.
    assert_eq!(repo.commit("merge", &sig()).unwrap_err().kind(), ErrorKind::Conflict);

    write(&repo, "f", &NUMBERS.replace("two", "TWO (both)"));
    repo.add("f").unwrap();
    let merged = repo.commit("merge topic", &sig()).unwrap();
    let commit = repo.odb().read_commit(&merged).unwrap();
    assert_eq!(commit.parents.len(), 2);
    assert_eq!(commit.parents[0], main_tip);
    assert!(repo.merge_head().unwrap().is_none());
}

#[test]
fn separate_files_merge_cleanly() {
    let (_dir, repo) = forked();
    on_topic(&repo, "topic.txt", "from topic\n", "topic file");
    let topic_tip = repo.refs().resolve(&vcs_ref::RefName::branch("topic").unwrap()).unwrap().unwrap();
    let main_tip = commit_file(&repo, "f", &NUMBERS.replace("ten", "TEN"), "main edit");

    let MergeOutcome::Merged { commit } = merge(&repo, "topic", &MergeOptions::default()).unwrap() else {
        panic!("expected a merge commit");
    };
    let merged = repo.odb().read_commit(&commit).unwrap();
    assert_eq!(merged.parents, vec![main_tip, topic_tip]);
    assert_eq!(merged.message, "Merge topic\n");

    assert_eq!(head(&repo), commit);
    assert_eq!(repo.current_branch().unwrap().unwrap().short_name(), "main");
    assert_eq!(read(&repo, "topic.txt"), "from topic\n");
    assert_eq!(read(&repo, "f"), NUMBERS.replace("ten", "TEN"));
    assert!(is_clean(&repo));
}

#[test]
fn edits_on_both_sides_of_one_file_combine() {
    let (_dir, repo) = forked();
    on_topic(&repo, "f", &NUMBERS.replace("nine", "NINE"), "topic edit");
    commit_file(&repo, "f", &NUMBERS.replace("one", "ONE"), "main edit");

    let outcome = merge(&repo, "topic", &MergeOptions::default()).unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { .. }));
    assert_eq!(read(&repo, "f"), NUMBERS.replace("one", "ONE").replace("nine", "NINE"));
}

#[test]
fn edit_follows_a_rename() {
    let (_dir, repo) = forked();
    on_topic(&repo, "f", &NUMBERS.replace("five", "FIVE"), "topic edit");
    write(&repo, "g", NUMBERS);
    repo.remove("f", false).unwrap();
    repo.add("g").unwrap();
    repo.commit("rename f to g", &sig()).unwrap();

    let outcome = merge(&repo, "topic", &MergeOptions::default()).unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { .. }), "{outcome:?}");
    assert!(!exists(&repo, "f"));
    assert_eq!(read(&repo, "g"), NUMBERS.replace("five", "FIVE"));
}

#[test]
fn fast_forward_and_no_ff() {
    let (_dir, repo) = forked();
    let base = head(&repo);
    on_topic(&repo, "t", "t\n", "topic");
    let topic_tip = repo.refs().resolve(&vcs_ref::RefName::branch("topic").unwrap()).unwrap().unwrap();

    let outcome = merge(&repo, "topic", &MergeOptions::default()).unwrap();
    assert_eq!(outcome, MergeOutcome::FastForward { from: base, to: topic_tip });
    assert_eq!(head(&repo), topic_tip);
    assert_eq!(read(&repo, "t"), "t\n");
    assert_eq!(repo.current_branch().unwrap().unwrap().short_name(), "main");

    // A second topic commit, merged with an explicit merge commit.
    on_topic(&repo, "t", "t2\n", "topic again");
    let opts = MergeOptions {
        no_ff: true,
        ..MergeOptions::default()
    };
    let MergeOutcome::Merged { commit } = merge(&repo, "topic", &opts).unwrap() else {
        panic!("expected a merge commit");
    };
    assert_eq!(repo.odb().read_commit(&commit).unwrap().parents.len(), 2);
    assert_eq!(read(&repo, "t"), "t2\n");
}

#[test]
fn already_merged_is_up_to_date() {
    let (_dir, repo) = forked();
    let tip = commit_file(&repo, "m", "m\n", "main only");
    assert_eq!(merge(&repo, "topic", &MergeOptions::default()).unwrap(), MergeOutcome::UpToDate);
    assert_eq!(head(&repo), tip);
}

#[test]
fn abort_restores_pre_merge_state() {
    let (_dir, repo) = forked();
    on_topic(&repo, "f", "topic\n", "topic rewrite");
    on_topic(&repo, "extra", "extra\n", "topic extra");
    let tip = commit_file(&repo, "f", "main\n", "main rewrite");

    let outcome = merge(&repo, "topic", &MergeOptions::default()).unwrap();
    assert!(matches!(outcome, MergeOutcome::Conflicted { .. }));
    assert!(exists(&repo, "extra"));

    merge_abort(&repo).unwrap();
    assert_eq!(head(&repo), tip);
    assert_eq!(read(&repo, "f"), "main\n");
    assert!(!exists(&repo, "extra"));
    assert!(repo.merge_head().unwrap().is_none());
    assert!(!repo.index().unwrap().has_conflicts());
    assert!(is_clean(&repo));

    assert!(matches!(merge_abort(&repo), Err(MergeError::NoMergeInProgress)));
}

#[test]
fn second_merge_waits_for_the_first() {
    let (_dir, repo) = forked();
    on_topic(&repo, "f", "topic\n", "topic rewrite");
    commit_file(&repo, "f", "main\n", "main rewrite");
    merge(&repo, "topic", &MergeOptions::default()).unwrap();
    assert!(matches!(
        merge(&repo, "topic", &MergeOptions::default()),
        Err(MergeError::MergeInProgress)
    ));
}

#[test]
fn local_changes_block_the_merge() {
    let (_dir, repo) = forked();
    on_topic(&repo, "f", &NUMBERS.replace("three", "THREE"), "topic edit");
    commit_file(&repo, "other", "o\n", "main file");
    let tip = head(&repo);
    write(&repo, "f", "uncommitted\n");

    let err = merge(&repo, "topic", &MergeOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(&err, MergeError::LocalChanges(paths) if paths == &["f"]));
    assert_eq!(read(&repo, "f"), "uncommitted\n");
    assert_eq!(head(&repo), tip);
    assert!(repo.refs().resolve(&vcs_ref::RefName::new("ORIG_HEAD").unwrap()).unwrap().is_none());
}

#[test]
fn unrelated_histories_need_permission() {
    let (_dir, repo) = repo();
    commit_file(&repo, "a", "a\n", "main root");

    let odb = repo.odb();
    let blob = odb.write_blob(b"b\n").unwrap();
    let mut files = PathMap::new();
    files.insert("b".into(), TreeItem { oid: blob, mode: FileMode::Regular });
    let tree = build_tree(odb, &files).unwrap();
    let root = odb
        .write(&Object::Commit(Commit::new(tree, vec![], sig(), "other root\n")))
        .unwrap();
    repo.create_branch("other", Some(root)).unwrap();

    assert!(matches!(
        merge(&repo, "other", &MergeOptions::default()),
        Err(MergeError::UnrelatedHistories)
    ));
    let opts = MergeOptions {
        allow_unrelated: true,
        ..MergeOptions::default()
    };
    assert!(matches!(merge(&repo, "other", &opts).unwrap(), MergeOutcome::Merged { .. }));
    assert_eq!(read(&repo, "a"), "a\n");
    assert_eq!(read(&repo, "b"), "b\n");
}
