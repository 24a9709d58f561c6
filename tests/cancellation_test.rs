//! Cancelling a context mid-operation must short-circuit the remaining work
//! rather than run it to completion (spec section 5, "Cancellation").

use chrono::Utc;
use memorybox::context::Context;
use memorybox::file::File;
use memorybox::ops::put::put;
use memorybox::store::local::LocalDiskStore;
use std::io::Cursor;

#[tokio::test]
async fn put_on_an_already_cancelled_context_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalDiskStore::new(dir.path()).await.unwrap();
    let ctx = Context::new();
    ctx.cancel();

    let file = File::from_body("stdin", Box::new(Cursor::new(b"x".to_vec())), Utc::now())
        .await
        .unwrap();
    let err = put(&store, &ctx, file, None).await.unwrap_err();
    assert!(err.is_cancelled());

    assert!(store.search(&ctx, "").await.unwrap().is_empty());
}

#[tokio::test]
async fn a_child_context_observes_its_parent_being_cancelled() {
    let parent = Context::new();
    let child = parent.child();
    assert!(child.check().is_ok());

    parent.cancel();
    assert!(child.is_cancelled());
    assert!(child.check().is_err());
}
