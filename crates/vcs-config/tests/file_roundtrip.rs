use vcs_config::Config;

#[test]
fn save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");

    let mut config = Config::load(&path).unwrap();
    assert_eq!(config.get("core.compression"), None);
    config.set("core.compression", "1").unwrap();
    config.set("merge.conflictStyle", "diff3").unwrap();
    config.set("user.email", "  spaced@example.com # not a comment").unwrap();
    config.save().unwrap();
    assert!(!dir.path().join("config.lock").exists());

    let back = Config::load(&path).unwrap();
    assert_eq!(back.get_int("core.compression").unwrap(), Some(1));
    assert_eq!(back.get("merge.conflictstyle"), Some("diff3"));
    assert_eq!(back.get("user.email"), Some("  spaced@example.com # not a comment"));
}

#[test]
fn unedited_file_is_reproduced_exactly() {
    let text = "; top\n[core]\n    compression=0   # fast\n\n[remote \"up stream\"]\n\turl = /tmp/x\n";
    assert_eq!(Config::parse(text).unwrap().to_text(), text);
}

#[test]
fn held_lock_blocks_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");
    std::fs::write(dir.path().join("config.lock"), b"").unwrap();
    let err = Config::new().write_to(&path).unwrap_err();
    assert_eq!(err.kind(), vcs_utils::ErrorKind::Conflict);
}
