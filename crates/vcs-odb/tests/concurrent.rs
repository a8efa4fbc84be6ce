use std::sync::Arc;
use std::thread;

use vcs_hash::HashAlgorithm;
use vcs_object::{Blob, Object};
use vcs_odb::ObjectDatabase;

#[test]
fn racing_writers_store_one_intact_object() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap());
    let payload = b"shared payload\n".repeat(1000);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = Arc::clone(&db);
            let payload = payload.clone();
            thread::spawn(move || db.write(&Object::Blob(Blob::new(payload))).unwrap())
        })
        .collect();
    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));

    let fresh = ObjectDatabase::open(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
    assert_eq!(fresh.iter().unwrap(), vec![ids[0]]);
    assert_eq!(fresh.read_blob(&ids[0]).unwrap().as_bytes(), payload.as_slice());

    let leftovers: Vec<_> = std::fs::read_dir(fresh.object_path(&ids[0]).parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn distinct_objects_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap());
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let db = Arc::clone(&db);
            thread::spawn(move || db.write_blob(format!("object {i}\n").as_bytes()).unwrap())
        })
        .collect();
    for h in handles {
        let oid = h.join().unwrap();
        assert!(db.contains(&oid));
    }
    assert_eq!(db.iter().unwrap().len(), 16);
}
