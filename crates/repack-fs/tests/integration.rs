use std::io::Write;

use repack_fs::{AtomicFile, AtomicWriteOptions, Error, WorkArea, atomic_write, remove_tree};
use tempfile::tempdir;

#[test]
fn test_atomic_write_basic() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.txt");

    atomic_write(&path, b"hello world", AtomicWriteOptions::new()).unwrap();

    assert!(path.exists());
    assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
}

#[test]
fn test_atomic_write_replaces_content() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("existing.txt");

    std::fs::write(&path, "original").unwrap();

    let result = atomic_write(&path, b"new content", AtomicWriteOptions::new());

    assert!(result.is_ok());
    assert_eq!(std::fs::read(&path).unwrap(), b"new content");
}

#[test]
fn test_abandoned_write_keeps_original() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("archive.zip");
    std::fs::write(&path, "original").unwrap();

    let mut file = AtomicFile::create(&path, AtomicWriteOptions::new()).unwrap();
    file.write_all(b"half written").unwrap();
    drop(file);

    assert_eq!(std::fs::read(&path).unwrap(), b"original");
}

#[test]
fn test_work_area_stage_and_remove() {
    let dir = tempdir().unwrap();
    let area = WorkArea::new_in(dir.path()).unwrap();
    let stage = area.stage("level").unwrap();
    std::fs::create_dir_all(stage.join("a/b")).unwrap();
    std::fs::write(stage.join("a/b/c.txt"), "c").unwrap();

    remove_tree(&stage).unwrap();
    assert!(!stage.exists());
    assert!(area.path().exists());

    let root = area.path().to_path_buf();
    drop(area);
    assert!(!root.exists());
}

#[test]
fn test_remove_tree_missing_reports_path() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("gone");
    let err = remove_tree(&missing).unwrap_err();
    assert_eq!(err.path(), missing.as_path());
}
