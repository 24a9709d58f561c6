//! Get / GetMeta: resolve a reference to exactly one stored file (spec
//! section 4.4).

use super::resolve_one;
use crate::context::Context;
use crate::error::Result;
use crate::file::File;
use crate::store::Store;

/// Resolve `reference` against datafile names and return it with an open
/// body. Caller owns the body and must close it.
pub async fn get<S: Store + ?Sized>(store: &S, ctx: &Context, reference: &str) -> Result<File> {
    ctx.check()?;
    let name = resolve_one(store, ctx, reference, false).await?;
    store.get(ctx, &name).await
}

/// Resolve `reference` against metafile names, fully materialize the body
/// into the returned File's metadata, and drop the streaming body —
/// metafile callers interact through the JSON accessors, not stream reads.
pub async fn get_meta<S: Store + ?Sized>(store: &S, ctx: &Context, reference: &str) -> Result<File> {
    ctx.check()?;
    let name = resolve_one(store, ctx, reference, true).await?;
    let mut raw = store.get(ctx, &name).await?;
    let last_modified = raw.last_modified();
    let bytes = raw.read_to_end().await?;
    File::from_meta_bytes(name, &bytes, last_modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryboxError;
    use crate::ops::put::put;
    use crate::store::local::LocalDiskStore;
    use chrono::Utc;
    use std::io::Cursor;

    #[tokio::test]
    async fn get_by_short_prefix_returns_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path()).await.unwrap();
        let ctx = Context::new();
        let file = File::from_body("stdin", Box::new(Cursor::new(b"test".to_vec())), Utc::now())
            .await
            .unwrap();
        put(&store, &ctx, file, None).await.unwrap();

        let mut got = get(&store, &ctx, "9f86d08188").await.unwrap();
        assert_eq!(got.read_to_end().await.unwrap(), b"test");
    }

    #[tokio::test]
    async fn get_unknown_prefix_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path()).await.unwrap();
        let ctx = Context::new();
        let err = get(&store, &ctx, "deadbeef").await.unwrap_err();
        assert!(matches!(err, MemoryboxError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_meta_materializes_body_and_drops_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path()).await.unwrap();
        let ctx = Context::new();
        let file = File::from_body("stdin", Box::new(Cursor::new(b"test".to_vec())), Utc::now())
            .await
            .unwrap();
        let data_name = file.name().to_string();
        put(&store, &ctx, file, None).await.unwrap();

        let meta = get_meta(&store, &ctx, "9f86d08188").await.unwrap();
        assert_eq!(meta.meta_file_field(), Some(data_name.as_str()));
    }
}
