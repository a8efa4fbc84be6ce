use vcs_hash::ObjectId;
use vcs_odb::ObjectDatabase;

use crate::{merge_trees, MergeLabels, MergeOptions, Result, TreeMergeResult};

/// Replay `commit`'s change onto `onto_tree`: a three-way merge with the
/// commit's first parent as base, `onto_tree` as ours and the commit as
/// theirs. A root commit replays against an empty base.
pub fn cherry_pick_tree(
    odb: &ObjectDatabase,
    commit: &ObjectId,
    onto_tree: &ObjectId,
    opts: &MergeOptions,
    labels: &MergeLabels<'_>,
) -> Result<TreeMergeResult> {
    let picked = odb.read_commit(commit)?;
    let base = match picked.first_parent() {
        Some(parent) => Some(odb.read_commit(parent)?.tree),
        None => None,
    };
    merge_trees(odb, base.as_ref(), onto_tree, &picked.tree, opts, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use tempfile::TempDir;
    use vcs_hash::HashAlgorithm;
    use vcs_index::{build_tree, TreeItem};
    use vcs_object::{Commit, FileMode, Object};
    use vcs_repository::PathMap;
    use vcs_utils::{Signature, Time};

    fn tree(odb: &ObjectDatabase, files: &[(&str, &str)]) -> ObjectId {
        let map: PathMap = files
            .iter()
            .map(|(p, d)| {
                let oid = odb.write_blob(d.as_bytes()).unwrap();
                (BString::from(*p), TreeItem { oid, mode: FileMode::Regular })
            })
            .collect();
        build_tree(odb, &map).unwrap()
    }

    fn commit(odb: &ObjectDatabase, tree: ObjectId, parents: Vec<ObjectId>) -> ObjectId {
        let sig = Signature::new("T", "t@example.com", Time::new(1700000000, 0));
        odb.write(&Object::Commit(Commit::new(tree, parents, sig, "c\n"))).unwrap()
    }

    #[test]
    fn replays_only_the_commits_own_change() {
        let dir = TempDir::new().unwrap();
        let odb = ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();

        let base = commit(&odb, tree(&odb, &[("a", "1\n"), ("b", "1\n")]), vec![]);
        let change = commit(&odb, tree(&odb, &[("a", "2\n"), ("b", "1\n")]), vec![base]);
        // The target already changed `b` differently and added `c`.
        let onto = tree(&odb, &[("a", "1\n"), ("b", "9\n"), ("c", "x\n")]);

        let result = cherry_pick_tree(&odb, &change, &onto, &MergeOptions::default(), &MergeLabels::default()).unwrap();
        assert!(result.is_clean());
        assert_eq!(result.tree, Some(tree(&odb, &[("a", "2\n"), ("b", "9\n"), ("c", "x\n")])));
    }

    #[test]
    fn root_commit_adds_its_files() {
        let dir = TempDir::new().unwrap();
        let odb = ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
        let root = commit(&odb, tree(&odb, &[("r", "root\n")]), vec![]);
        let onto = tree(&odb, &[("o", "onto\n")]);
        let result = cherry_pick_tree(&odb, &root, &onto, &MergeOptions::default(), &MergeLabels::default()).unwrap();
        assert_eq!(result.tree, Some(tree(&odb, &[("o", "onto\n"), ("r", "root\n")])));
    }
}
