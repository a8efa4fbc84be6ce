mod common;

use common::*;
use vcs_hash::ObjectId;
use vcs_merge::{amend, combine, merge, split, MergeError, MergeOptions, MergeOutcome, SplitGroup};
use vcs_repository::Repository;
use vcs_revwalk::{log, LogOptions};
use vcs_utils::ErrorKind;

struct History {
    _dir: tempfile::TempDir,
    repo: Repository,
    first: ObjectId,
    multi: ObjectId,
    last: ObjectId,
}

/// `first` adds `a`, `multi` adds `x`, `y` and `z`, `last` adds `w`.
fn history() -> History {
    let (dir, repo) = repo();
    let first = commit_file(&repo, "a", "a\n", "first");
    for (path, content) in [("x", "x\n"), ("y", "y\n"), ("z", "z\n")] {
        write(&repo, path, content);
        repo.add(path).unwrap();
    }
    let multi = repo.commit("multi\n\nthree files at once", &sig()).unwrap();
    let last = commit_file(&repo, "w", "w\n", "last");
    History {
        _dir: dir,
        repo,
        first,
        multi,
        last,
    }
}

/// First-parent history from `HEAD`, newest first.
fn chain(repo: &Repository) -> Vec<(ObjectId, vcs_object::Commit)> {
    log(repo, head(repo), None, &LogOptions { first_parent: true })
        .unwrap()
        .into_iter()
        .map(|e| (e.oid, e.commit))
        .collect()
}

fn tree_of(repo: &Repository, oid: &ObjectId) -> ObjectId {
    repo.odb().read_commit(oid).unwrap().tree
}

#[test]
fn split_into_groups_with_a_remainder() {
    let h = history();
    let groups = [
        SplitGroup::new(["x"]),
        SplitGroup::new(["y"]).with_message("just y"),
    ];
    let pieces = split(&h.repo, &h.multi, &groups).unwrap();
    assert_eq!(pieces.len(), 3);

    let messages: Vec<String> = pieces.iter().map(|p| message(&h.repo, p)).collect();
    assert_eq!(messages, ["multi (1/3)\n", "just y\n", "multi (3/3)\n"]);

    // Each piece adds its own paths on top of the previous one.
    let first_piece = h.repo.commit_paths(&pieces[0]).unwrap();
    assert!(first_piece.contains_key(&bstr::BString::from("x")));
    assert!(!first_piece.contains_key(&bstr::BString::from("y")));
    assert_eq!(tree_of(&h.repo, &pieces[2]), tree_of(&h.repo, &h.multi));
    let original = h.repo.odb().read_commit(&h.multi).unwrap();
    for piece in &pieces {
        assert_eq!(h.repo.odb().read_commit(piece).unwrap().author, original.author);
    }

    // The later commit sits on the last piece with its tree unchanged.
    let history = chain(&h.repo);
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].1.tree, tree_of(&h.repo, &h.last));
    assert_eq!(history[0].1.parents, vec![pieces[2]]);
    assert_eq!(history[3].1.parents, vec![h.first]);
    assert_eq!(h.repo.current_branch().unwrap().unwrap().short_name(), "main");
    assert!(is_clean(&h.repo));
}

#[test]
fn split_rejects_bad_groups() {
    let h = history();
    let unchanged = split(&h.repo, &h.multi, &[SplitGroup::new(["a"])]).unwrap_err();
    assert_eq!(unchanged.kind(), ErrorKind::Invalid);

    let twice = split(&h.repo, &h.multi, &[SplitGroup::new(["x"]), SplitGroup::new(["x"])]).unwrap_err();
    assert!(matches!(twice, MergeError::InvalidRewrite(_)));

    let blob = h.repo.odb().write_blob(b"nope").unwrap();
    assert!(matches!(
        split(&h.repo, &blob, &[]),
        Err(MergeError::NotOnBranch(oid)) if oid == blob
    ));
    assert_eq!(head(&h.repo), h.last);
}

#[test]
fn combine_contiguous_commits() {
    let h = history();
    // Order of the arguments does not matter.
    let combined = combine(&h.repo, &[h.last, h.multi], "x, y, z and w").unwrap();

    let commit = h.repo.odb().read_commit(&combined).unwrap();
    assert_eq!(commit.parents, vec![h.first]);
    assert_eq!(commit.tree, tree_of(&h.repo, &h.last));
    assert_eq!(commit.message, "x, y, z and w\n");
    assert_eq!(commit.author, h.repo.odb().read_commit(&h.multi).unwrap().author);
    assert_eq!(head(&h.repo), combined);
    assert_eq!(chain(&h.repo).len(), 2);
}

#[test]
fn combine_reparents_later_commits() {
    let h = history();
    let combined = combine(&h.repo, &[h.first, h.multi], "a, x, y, z").unwrap();
    let history = chain(&h.repo);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].1.parents, vec![combined]);
    assert_eq!(history[0].1.tree, tree_of(&h.repo, &h.last));
    assert!(h.repo.odb().read_commit(&combined).unwrap().parents.is_empty());
}

#[test]
fn combine_rejections() {
    let h = history();
    let gap = combine(&h.repo, &[h.first, h.last], "gap").unwrap_err();
    assert_eq!(gap.kind(), ErrorKind::Invalid);
    let empty = combine(&h.repo, &[h.multi, h.last], "  \n").unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::Invalid);
    let duplicate = combine(&h.repo, &[h.multi, h.multi], "dup").unwrap_err();
    assert_eq!(duplicate.kind(), ErrorKind::Invalid);
    assert_eq!(head(&h.repo), h.last);
}

#[test]
fn combine_refuses_a_run_starting_at_a_merge() {
    let (_dir, repo) = repo();
    commit_file(&repo, "base", "base\n", "base");
    repo.create_branch("side", None).unwrap();
    repo.checkout("side").unwrap();
    commit_file(&repo, "s", "side\n", "side work");
    repo.checkout("main").unwrap();
    commit_file(&repo, "m", "main\n", "main work");
    let MergeOutcome::Merged { commit: merged } = merge(&repo, "side", &MergeOptions::default()).unwrap() else {
        panic!("expected a merge commit");
    };
    let after = commit_file(&repo, "after", "after\n", "after the merge");

    let err = combine(&repo, &[merged, after], "squashed").unwrap_err();
    assert!(matches!(err, MergeError::InvalidRewrite(_)), "{err}");
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert_eq!(head(&repo), after);
}

#[test]
fn amend_with_files_and_message() {
    let h = history();
    write(&h.repo, "w", "w, fixed\n");
    let amended = amend(&h.repo, &["w"], None).unwrap();

    let old = h.repo.odb().read_commit(&h.last).unwrap();
    let new = h.repo.odb().read_commit(&amended).unwrap();
    assert_eq!(new.parents, old.parents);
    assert_eq!(new.author, old.author);
    assert_eq!(new.message, old.message);
    assert_ne!(new.tree, old.tree);
    assert_eq!(head(&h.repo), amended);
    assert!(is_clean(&h.repo));

    let reworded = amend::<&str>(&h.repo, &[], Some("last, reworded")).unwrap();
    assert_eq!(message(&h.repo, &reworded), "last, reworded\n");
    assert_eq!(tree_of(&h.repo, &reworded), new.tree);
    assert_eq!(chain(&h.repo).len(), 3);
}

#[test]
fn amend_needs_a_commit() {
    let (_dir, repo) = repo();
    let err = amend::<&str>(&repo, &[], Some("nothing")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}
