//! End-to-end coverage across the archive operations against a tempfile-backed
//! local store (spec section 8, "End-to-end scenarios").

use chrono::Utc;
use memorybox::context::Context;
use memorybox::file::{meta_name_of, File};
use memorybox::logger::Logger;
use memorybox::ops::check::{check, CheckMode};
use memorybox::ops::delete::delete;
use memorybox::ops::diff::diff;
use memorybox::ops::get::get;
use memorybox::ops::import::import;
use memorybox::ops::meta::{meta_get, meta_set};
use memorybox::ops::put::put;
use memorybox::ops::sync::{sync, SyncMode};
use memorybox::store::local::LocalDiskStore;
use memorybox::store::Store;
use std::io::Cursor;
use std::sync::Arc;

fn body(bytes: &[u8]) -> memorybox::file::Body {
    Box::new(Cursor::new(bytes.to_vec()))
}

#[tokio::test]
async fn put_then_get_round_trips_bytes_and_digest_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalDiskStore::new(dir.path()).await.unwrap();
    let ctx = Context::new();

    let file = File::from_body("stdin", body(b"hello world"), Utc::now()).await.unwrap();
    let expected_name = file.name().to_string();
    put(&store, &ctx, file, None).await.unwrap();

    let mut got = get(&store, &ctx, &expected_name[..12]).await.unwrap();
    assert_eq!(got.name(), expected_name);
    assert_eq!(got.read_to_end().await.unwrap(), b"hello world");
}

#[tokio::test]
async fn meta_set_survives_a_put_then_delete_removes_both_halves() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalDiskStore::new(dir.path()).await.unwrap();
    let ctx = Context::new();

    let file = File::from_body("report.csv", body(b"a,b,c"), Utc::now()).await.unwrap();
    let data_name = file.name().to_string();
    put(&store, &ctx, file, None).await.unwrap();

    meta_set(&store, &ctx, &data_name, "project", "q3-report").await.unwrap();
    let meta = meta_get(&store, &ctx, &data_name).await.unwrap();
    assert_eq!(meta.get("project").unwrap(), "q3-report");
    assert_eq!(meta.meta_file_field(), Some(data_name.as_str()));

    delete(&store, &ctx, &data_name[..12]).await.unwrap();
    assert!(store.stat(&ctx, &data_name).await.unwrap_err().is_not_found());
    assert!(store.stat(&ctx, &meta_name_of(&data_name)).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn import_of_same_manifest_twice_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(LocalDiskStore::new(dir.path().join("archive")).await.unwrap());
    let ctx = Context::new();
    let logger = Logger::silent();

    let src_dir = tempfile::tempdir().unwrap();
    let a = src_dir.path().join("a.txt");
    let b = src_dir.path().join("b.txt");
    tokio::fs::write(&a, b"file a").await.unwrap();
    tokio::fs::write(&b, b"file b").await.unwrap();
    let manifest = format!("{}\n{} {{\"tag\":\"b\"}}\n", a.display(), b.display());

    import(store.clone(), &ctx, &logger, reqwest::Client::new(), 4, "batch-1", &manifest)
        .await
        .unwrap();
    let first_pass = store.search(&ctx, "").await.unwrap().len();
    assert_eq!(first_pass, 4);

    import(store.clone(), &ctx, &logger, reqwest::Client::new(), 4, "batch-1", &manifest)
        .await
        .unwrap();
    let second_pass = store.search(&ctx, "").await.unwrap().len();
    assert_eq!(second_pass, first_pass);
}

#[tokio::test]
async fn sync_all_then_check_pairing_reports_nothing() {
    let src_dir = tempfile::tempdir().unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    let source = LocalDiskStore::new(src_dir.path()).await.unwrap();
    let dest = LocalDiskStore::new(dst_dir.path()).await.unwrap();
    let ctx = Context::new();
    let logger = Logger::silent();

    for content in [&b"one"[..], &b"two"[..], &b"three"[..]] {
        let file = File::from_body("stdin", body(content), Utc::now()).await.unwrap();
        put(&source, &ctx, file, None).await.unwrap();
    }

    sync(&source, &dest, &ctx, &logger, SyncMode::All, 4).await.unwrap();
    assert!(diff(&source, &dest, &ctx).await.unwrap().is_empty());

    let report = check(&dest, &ctx, &logger, 4, CheckMode::Pairing).await.unwrap();
    assert!(report.findings.is_empty());
    assert_eq!(report.unpaired_count, 0);
    assert_eq!(report.datafile_count, 3);
}

#[tokio::test]
async fn check_datafiles_mode_flags_a_corrupted_body() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalDiskStore::new(dir.path()).await.unwrap();
    let ctx = Context::new();
    let logger = Logger::silent();

    let file = File::from_body("stdin", body(b"trustworthy"), Utc::now()).await.unwrap();
    let data_name = file.name().to_string();
    put(&store, &ctx, file, None).await.unwrap();
    tokio::fs::write(dir.path().join(&data_name), b"tampered").await.unwrap();

    let report = check(&store, &ctx, &logger, 4, CheckMode::Datafiles).await.unwrap();
    assert_eq!(report.findings.len(), 1);
    assert!(report.findings[0].contains(&data_name));
}
