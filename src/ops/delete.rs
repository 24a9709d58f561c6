//! Delete: resolve a reference, then remove its datafile/metafile pair
//! concurrently (spec section 4.4).

use super::resolve_one;
use crate::context::Context;
use crate::error::Result;
use crate::file::meta_name_of;
use crate::store::Store;

pub async fn delete<S: Store + ?Sized>(store: &S, ctx: &Context, reference: &str) -> Result<()> {
    ctx.check()?;
    let data_name = resolve_one(store, ctx, reference, false).await?;
    let meta_name = meta_name_of(&data_name);
    tokio::try_join!(store.delete(ctx, &data_name), store.delete(ctx, &meta_name))?;
    Ok(())
}
