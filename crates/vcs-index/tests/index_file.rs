use bstr::{BString, ByteSlice};
use proptest::prelude::*;
use vcs_hash::{HashAlgorithm, ObjectId};
use vcs_index::{flatten_tree, Index, IndexEntry, IndexError, Stage, StatData};
use vcs_object::FileMode;
use vcs_odb::ObjectDatabase;
use vcs_utils::ErrorKind;

fn sample(odb: &ObjectDatabase) -> Index {
    let mut index = Index::new(HashAlgorithm::Sha1);
    for (path, content, mode) in [
        ("README", &b"readme\n"[..], FileMode::Regular),
        ("src/main.rs", &b"fn main() {}\n"[..], FileMode::Regular),
        ("src/util/mod.rs", &b""[..], FileMode::Regular),
        ("run.sh", &b"#!/bin/sh\n"[..], FileMode::Executable),
    ] {
        let oid = odb.write_blob(content).unwrap();
        let stat = StatData {
            mtime_secs: 1_700_000_000,
            mtime_nsecs: 5,
            size: content.len() as u32,
            ..StatData::default()
        };
        index.add(IndexEntry::new(path, oid, mode).with_stat(stat));
    }
    index
}

#[test]
fn write_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let odb = ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
    let index = sample(&odb);
    let path = dir.path().join("index");
    index.write_to(&path).unwrap();

    let loaded = Index::load(&path, HashAlgorithm::Sha1).unwrap();
    let a: Vec<_> = index.iter().cloned().collect();
    let b: Vec<_> = loaded.iter().cloned().collect();
    assert_eq!(a, b);
    assert!(!dir.path().join("index.lock").exists());
}

#[test]
fn missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let index = Index::load(dir.path().join("index"), HashAlgorithm::Sha1).unwrap();
    assert!(index.is_empty());
}

#[test]
fn damaged_files_are_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let odb = ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
    let bytes = sample(&odb).serialize().unwrap();

    let mut flipped = bytes.clone();
    flipped[20] ^= 0x01;
    let err = Index::parse(&flipped, HashAlgorithm::Sha1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corrupt);

    for cut in [0, 11, 40, bytes.len() - 1] {
        let err = Index::parse(&bytes[..cut], HashAlgorithm::Sha1).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)), "cut at {cut}: {err}");
    }
}

#[test]
fn write_tree_nests_and_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let odb = ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
    let index = sample(&odb);
    let root = index.write_tree(&odb).unwrap();

    let top = odb.read_tree(&root).unwrap();
    let names: Vec<_> = top.iter().map(|e| e.name.to_string()).collect();
    assert_eq!(names, ["README", "run.sh", "src"]);
    assert!(top.find(b"src".as_bstr()).unwrap().mode.is_tree());

    let flat = flatten_tree(&odb, &root).unwrap();
    assert_eq!(flat.len(), 4);
    assert_eq!(flat[&BString::from("run.sh")].mode, FileMode::Executable);

    let mut again = Index::new(HashAlgorithm::Sha1);
    again.read_tree(&odb, &root).unwrap();
    assert_eq!(again.write_tree(&odb).unwrap(), root);
}

#[test]
fn empty_index_writes_empty_tree() {
    let dir = tempfile::tempdir().unwrap();
    let odb = ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
    let root = Index::new(HashAlgorithm::Sha1).write_tree(&odb).unwrap();
    assert_eq!(root.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
}

#[test]
fn unmerged_index_refuses_tree() {
    let dir = tempfile::tempdir().unwrap();
    let odb = ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
    let mut index = sample(&odb);
    let oid = odb.write_blob(b"x").unwrap();
    index.add(IndexEntry::new("c", oid, FileMode::Regular).with_stage(Stage::Ours));
    let err = index.write_tree(&odb).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn file_and_directory_at_same_path() {
    let dir = tempfile::tempdir().unwrap();
    let odb = ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
    let oid = odb.write_blob(b"x").unwrap();
    let mut index = Index::new(HashAlgorithm::Sha1);
    index.add(IndexEntry::new("a", oid, FileMode::Regular));
    index.add(IndexEntry::new("a/b", oid, FileMode::Regular));
    assert!(matches!(index.write_tree(&odb), Err(IndexError::PathConflict(_))));
}

#[test]
fn missing_blob_is_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let odb = ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
    let ghost = ObjectId::from_bytes(&[9; 20], HashAlgorithm::Sha1).unwrap();
    let mut index = Index::new(HashAlgorithm::Sha1);
    index.add(IndexEntry::new("ghost", ghost, FileMode::Regular));
    let err = index.write_tree(&odb).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(odb.iter().unwrap().is_empty());
}

fn any_entry() -> impl Strategy<Value = IndexEntry> {
    (
        "[a-z]{1,6}(/[a-z0-9_-]{1,6}(\\.[a-z]{1,3})?){0,3}",
        any::<[u8; 20]>(),
        prop::sample::select(vec![FileMode::Regular, FileMode::Executable, FileMode::Symlink]),
        prop::sample::select(vec![Stage::Normal, Stage::Base, Stage::Ours, Stage::Theirs]),
        any::<[u32; 9]>(),
    )
        .prop_map(|(path, digest, mode, stage, s)| {
            let oid = ObjectId::from_bytes(&digest, HashAlgorithm::Sha1).unwrap();
            let stat = StatData {
                ctime_secs: s[0],
                ctime_nsecs: s[1],
                mtime_secs: s[2],
                mtime_nsecs: s[3],
                dev: s[4],
                ino: s[5],
                uid: s[6],
                gid: s[7],
                size: s[8],
            };
            IndexEntry::new(path, oid, mode).with_stage(stage).with_stat(stat)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn serialized_index_parses_to_the_same_entries(entries in prop::collection::vec(any_entry(), 0..24)) {
        let mut index = Index::new(HashAlgorithm::Sha1);
        for entry in entries {
            index.add(entry);
        }
        let bytes = index.serialize().unwrap();
        let parsed = Index::parse(&bytes, HashAlgorithm::Sha1).unwrap();

        let before: Vec<_> = index.iter().cloned().collect();
        let after: Vec<_> = parsed.iter().cloned().collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(parsed.serialize().unwrap(), bytes);
        prop_assert_eq!(parsed.has_conflicts(), index.has_conflicts());
    }
}
