#![allow(dead_code)]

use std::fs;

use vcs_hash::ObjectId;
use vcs_repository::Repository;
use vcs_utils::{Signature, Time};

pub fn sig() -> Signature {
    Signature::new("Test", "test@example.com", Time::new(1_700_000_000, 0))
}

pub fn repo() -> (tempfile::TempDir, Repository) {
    let dir = tempfile::tempdir().unwrap();
    let mut repo = Repository::init(dir.path()).unwrap();
    repo.set_config("user.name", "Test").unwrap();
    repo.set_config("user.email", "test@example.com").unwrap();
    (dir, repo)
}

pub fn write(repo: &Repository, path: &str, content: &str) {
    let full = repo.work_tree().join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

pub fn read(repo: &Repository, path: &str) -> String {
    fs::read_to_string(repo.work_tree().join(path)).unwrap()
}

pub fn exists(repo: &Repository, path: &str) -> bool {
    repo.work_tree().join(path).exists()
}

pub fn commit_file(repo: &Repository, path: &str, content: &str, msg: &str) -> ObjectId {
    write(repo, path, content);
    repo.add(path).unwrap();
    repo.commit(msg, &sig()).unwrap()
}

pub fn head(repo: &Repository) -> ObjectId {
    repo.head_oid().unwrap().unwrap()
}

pub const NUMBERS: &str = "one\ntwo\nthree\nfour\nfive\nsix\nseven\neight\nnine\nten\n";
