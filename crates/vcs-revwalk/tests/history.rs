use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use vcs_hash::ObjectId;
use vcs_object::{Commit, Object, Tree};
use vcs_ref::{RefName, RefTransaction};
use vcs_repository::Repository;
use vcs_revwalk::{
    commits_between, is_ancestor, log, merge_base, merge_bases, resolve_revision, LogOptions,
    RevWalkError,
};
use vcs_utils::{ErrorKind, Signature, Time};

struct Graph {
    _dir: tempfile::TempDir,
    repo: Repository,
    tree: ObjectId,
}

impl Graph {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let tree = repo.odb().write(&Object::Tree(Tree::new())).unwrap();
        Self {
            _dir: dir,
            repo,
            tree,
        }
    }

    fn commit(&self, msg: &str, date: i64, parents: &[ObjectId]) -> ObjectId {
        let sig = Signature::new("T", "t@example.com", Time::new(date, 0));
        let commit = Commit::new(self.tree, parents.to_vec(), sig, format!("{msg}\n"));
        self.repo.odb().write(&Object::Commit(commit)).unwrap()
    }

    fn branch(&self, name: &str, at: ObjectId) {
        let mut tx = RefTransaction::new();
        tx.create(RefName::branch(name).unwrap(), at, "branch: created");
        let sig = Signature::new("T", "t@example.com", Time::new(0, 0));
        self.repo.update_refs(tx, Some(&sig)).unwrap();
    }

    fn summaries(&self, from: ObjectId, opts: &LogOptions) -> Vec<String> {
        log(&self.repo, from, None, opts)
            .unwrap()
            .iter()
            .map(|e| e.commit.summary().to_string())
            .collect()
    }
}

#[test]
fn log_is_newest_first_and_respects_limit() {
    let g = Graph::new();
    let a = g.commit("a", 100, &[]);
    let b = g.commit("b", 200, &[a]);
    let c = g.commit("c", 300, &[b]);

    assert_eq!(g.summaries(c, &LogOptions::default()), ["c", "b", "a"]);
    let two = log(&g.repo, c, Some(2), &LogOptions::default()).unwrap();
    assert_eq!(two.len(), 2);
    assert_eq!(two[0].oid, c);
}

#[test]
fn log_visits_shared_ancestry_once() {
    let g = Graph::new();
    let root = g.commit("root", 100, &[]);
    let left = g.commit("left", 200, &[root]);
    let right = g.commit("right", 300, &[root]);
    let merge = g.commit("merge", 400, &[left, right]);

    assert_eq!(
        g.summaries(merge, &LogOptions::default()),
        ["merge", "right", "left", "root"]
    );
    assert_eq!(
        g.summaries(merge, &LogOptions { first_parent: true }),
        ["merge", "left", "root"]
    );
}

#[test]
fn commits_between_excludes_base_history() {
    let g = Graph::new();
    let a = g.commit("a", 100, &[]);
    let b = g.commit("b", 200, &[a]);
    let c = g.commit("c", 300, &[b]);
    let d = g.commit("d", 400, &[c]);

    let range = commits_between(&g.repo, b, d).unwrap();
    let oids: Vec<_> = range.iter().map(|e| e.oid).collect();
    assert_eq!(oids, [c, d]);
    assert!(commits_between(&g.repo, d, b).unwrap().is_empty());
}

#[test]
fn merge_base_of_diverged_branches() {
    let g = Graph::new();
    let root = g.commit("root", 100, &[]);
    let base = g.commit("base", 200, &[root]);
    let ours = g.commit("ours", 300, &[base]);
    let theirs = g.commit("theirs", 400, &[base]);
    let theirs2 = g.commit("theirs2", 500, &[theirs]);

    assert_eq!(merge_base(&g.repo, &ours, &theirs2).unwrap(), Some(base));
    assert_eq!(merge_base(&g.repo, &theirs2, &ours).unwrap(), Some(base));
    // An ancestor is its own merge base with a descendant.
    assert_eq!(merge_base(&g.repo, &base, &theirs2).unwrap(), Some(base));
    assert_eq!(merge_base(&g.repo, &ours, &ours).unwrap(), Some(ours));
}

#[test]
fn merge_base_ignores_skewed_dates() {
    let g = Graph::new();
    let root = g.commit("root", 1000, &[]);
    // A child dated before its parent.
    let base = g.commit("base", 10, &[root]);
    let ours = g.commit("ours", 2000, &[base]);
    let theirs = g.commit("theirs", 5, &[base]);
    assert_eq!(merge_base(&g.repo, &ours, &theirs).unwrap(), Some(base));
}

#[test]
fn unrelated_histories_have_no_base() {
    let g = Graph::new();
    let a = g.commit("a", 100, &[]);
    let b = g.commit("b", 200, &[]);
    assert_eq!(merge_base(&g.repo, &a, &b).unwrap(), None);
    assert!(!is_ancestor(&g.repo, &a, &b).unwrap());
}

#[test]
fn criss_cross_has_two_bases() {
    let g = Graph::new();
    let root = g.commit("root", 1, &[]);
    let a1 = g.commit("a1", 2, &[root]);
    let b1 = g.commit("b1", 3, &[root]);
    let a2 = g.commit("a2", 4, &[a1, b1]);
    let b2 = g.commit("b2", 5, &[b1, a1]);

    let bases = merge_bases(&g.repo, &a2, &b2).unwrap();
    assert_eq!(bases, [b1, a1]);
    assert_eq!(merge_base(&g.repo, &a2, &b2).unwrap(), Some(b1));
}

#[test]
fn ancestry() {
    let g = Graph::new();
    let a = g.commit("a", 100, &[]);
    let b = g.commit("b", 200, &[a]);
    let side = g.commit("side", 300, &[a]);
    assert!(is_ancestor(&g.repo, &a, &b).unwrap());
    assert!(is_ancestor(&g.repo, &b, &b).unwrap());
    assert!(!is_ancestor(&g.repo, &b, &a).unwrap());
    assert!(!is_ancestor(&g.repo, &side, &b).unwrap());
}

#[test]
fn revision_expressions() {
    let g = Graph::new();
    let a = g.commit("a", 100, &[]);
    let b = g.commit("b", 200, &[a]);
    let side = g.commit("side", 250, &[a]);
    let m = g.commit("m", 300, &[b, side]);
    g.branch("topic", m);

    let r = |s: &str| resolve_revision(&g.repo, s);
    assert_eq!(r("topic").unwrap(), m);
    assert_eq!(r("refs/heads/topic").unwrap(), m);
    assert_eq!(r("heads/topic").unwrap(), m);
    assert_eq!(r("topic^").unwrap(), b);
    assert_eq!(r("topic^2").unwrap(), side);
    assert_eq!(r("topic^0").unwrap(), m);
    assert_eq!(r("topic~2").unwrap(), a);
    assert_eq!(r("topic^2~1").unwrap(), a);
    assert_eq!(r(&m.to_hex()).unwrap(), m);
    assert_eq!(r(&m.to_hex()[..10]).unwrap(), m);

    let err = r("topic~3").unwrap_err();
    assert!(matches!(err, RevWalkError::NoSuchParent(oid, 1) if oid == a));
    assert_eq!(r("nope").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(r("").unwrap_err().kind(), ErrorKind::Invalid);
    assert_eq!(r("^2").unwrap_err().kind(), ErrorKind::Invalid);
}

fn reachable(parents: &HashMap<ObjectId, Vec<ObjectId>>, from: ObjectId) -> HashSet<ObjectId> {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(oid) = stack.pop() {
        if seen.insert(oid) {
            stack.extend(parents[&oid].iter().copied());
        }
    }
    seen
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn log_over_random_dag_terminates_without_repeats(
        shape in proptest::collection::vec(
            (any::<prop::sample::Index>(), any::<prop::sample::Index>(), 0u8..3, 0i64..50),
            1..30,
        )
    ) {
        let g = Graph::new();
        let mut oids: Vec<ObjectId> = Vec::new();
        let mut parents = HashMap::new();
        for (i, (p1, p2, count, date)) in shape.iter().enumerate() {
            let mut ps = Vec::new();
            if i > 0 {
                if *count >= 1 {
                    ps.push(oids[p1.index(i)]);
                }
                if *count == 2 {
                    let second = oids[p2.index(i)];
                    if !ps.contains(&second) {
                        ps.push(second);
                    }
                }
            }
            let oid = g.commit(&format!("c{i}"), *date, &ps);
            parents.insert(oid, ps);
            oids.push(oid);
        }

        let tip = *oids.last().unwrap();
        let entries = log(&g.repo, tip, None, &LogOptions::default()).unwrap();
        let visited: Vec<ObjectId> = entries.iter().map(|e| e.oid).collect();
        let unique: HashSet<ObjectId> = visited.iter().copied().collect();
        prop_assert_eq!(unique.len(), visited.len());
        prop_assert_eq!(unique, reachable(&parents, tip));
    }
}
