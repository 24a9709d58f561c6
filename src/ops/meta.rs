//! MetaGet / MetaSet / MetaDelete: read and mutate a metafile's JSON body
//! (spec section 4.4).

use super::{get::get_meta, resolve_one};
use crate::context::Context;
use crate::error::Result;
use crate::file::{Body, File};
use crate::store::Store;
use chrono::Utc;
use std::io::Cursor;

/// Stream the metafile body to the caller; identical to [`get_meta`] — kept
/// as a distinct name matching the spec's `MetaGet` operation.
pub async fn meta_get<S: Store + ?Sized>(store: &S, ctx: &Context, reference: &str) -> Result<File> {
    get_meta(store, ctx, reference).await
}

async fn load_for_mutation<S: Store + ?Sized>(store: &S, ctx: &Context, reference: &str) -> Result<(String, File)> {
    let name = resolve_one(store, ctx, reference, true).await?;
    let mut raw = store.get(ctx, &name).await?;
    let last_modified = raw.last_modified();
    let bytes = raw.read_to_end().await?;
    let file = File::from_meta_bytes(name.clone(), &bytes, last_modified)?;
    Ok((name, file))
}

async fn rewrite<S: Store + ?Sized>(store: &S, ctx: &Context, name: &str, file: &File) -> Result<()> {
    let body: Body = Box::new(Cursor::new(file.meta_bytes()));
    store.put(ctx, body, name, Utc::now()).await
}

/// Set a user-owned key (the `memorybox*` ban is enforced by [`File::set`]).
pub async fn meta_set<S: Store + ?Sized>(store: &S, ctx: &Context, reference: &str, key: &str, value: &str) -> Result<()> {
    ctx.check()?;
    let (name, mut file) = load_for_mutation(store, ctx, reference).await?;
    file.set(key, value);
    rewrite(store, ctx, &name, &file).await
}

/// Delete a user-owned key (the `memorybox*` ban is enforced by [`File::delete`]).
pub async fn meta_delete<S: Store + ?Sized>(store: &S, ctx: &Context, reference: &str, key: &str) -> Result<()> {
    ctx.check()?;
    let (name, mut file) = load_for_mutation(store, ctx, reference).await?;
    file.delete(key);
    rewrite(store, ctx, &name, &file).await
}
