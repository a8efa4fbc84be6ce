//! Racing writers of one ref: exactly one wins, the rest see `Conflict`.

use std::sync::{Arc, Barrier};
use std::thread;

use vcs_hash::ObjectId;
use vcs_ref::{RefName, RefStore, RefTransaction};
use vcs_utils::ErrorKind;

fn oid(n: usize) -> ObjectId {
    ObjectId::from_hex(&format!("{n:040x}")).unwrap()
}

#[test]
fn one_writer_wins_the_race() {
    let dir = tempfile::tempdir().unwrap();
    let main = RefName::branch("main").unwrap();
    let store = RefStore::new(dir.path());
    let mut tx = RefTransaction::new();
    tx.create(main.clone(), oid(1), "initial");
    store.commit(tx).unwrap();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let repo_dir = dir.path().to_path_buf();
            let barrier = Arc::clone(&barrier);
            let main = main.clone();
            thread::spawn(move || {
                let store = RefStore::new(&repo_dir);
                let mut tx = RefTransaction::new();
                tx.update(main, oid(1), oid(i + 2), "advance");
                barrier.wait();
                store.commit(tx).map(|()| oid(i + 2))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::Conflict, "{err}");
    }

    let store = RefStore::new(dir.path());
    assert_eq!(store.resolve(&main).unwrap(), Some(*winners[0]));
    let leftovers = std::fs::read_dir(dir.path().join("refs/heads"))
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".lock"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn readers_never_see_partial_contents() {
    let dir = tempfile::tempdir().unwrap();
    let main = RefName::branch("main").unwrap();
    let store = RefStore::new(dir.path());
    let mut tx = RefTransaction::new();
    tx.create(main.clone(), oid(1), "");
    store.commit(tx).unwrap();

    let writer = {
        let repo_dir = dir.path().to_path_buf();
        let main = main.clone();
        thread::spawn(move || {
            let store = RefStore::new(&repo_dir);
            for n in 1..200 {
                let mut tx = RefTransaction::new();
                tx.update(main.clone(), oid(n), oid(n + 1), "");
                store.commit(tx).unwrap();
            }
        })
    };
    for _ in 0..500 {
        // Every observed value parses; a torn write would not.
        assert!(store.resolve(&main).unwrap().is_some());
    }
    writer.join().unwrap();
    assert_eq!(store.resolve(&main).unwrap(), Some(oid(200)));
}
