//! The YAML target-config document end to end: parse, resolve a target,
//! build the backend it names (spec section 6, "Configuration file").

use memorybox::config::{store_for_target, BackendKind, TargetsFile};

#[tokio::test]
async fn local_disk_target_resolves_to_a_working_store() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "targets:\n  archive:\n    backend: localDisk\n    path: {}\n",
        dir.path().join("box").display()
    );
    let targets = TargetsFile::parse(&yaml).unwrap();
    let target = targets.target("archive").unwrap();
    assert_eq!(target.backend, BackendKind::LocalDisk);

    let store = store_for_target(target).await.unwrap();
    assert!(store.label().starts_with("local:"));
}

#[test]
fn unknown_target_name_is_not_found() {
    let targets = TargetsFile::parse("targets:\n  only-one:\n    backend: localDisk\n    path: /tmp/x\n").unwrap();
    let err = targets.target("missing").unwrap_err();
    assert!(err.is_not_found());
}
