//! Sync: stream source files a destination lacks or hasn't caught up with
//! (spec section 4.4).

use super::run_bounded;
use crate::context::Context;
use crate::error::{MemoryboxError, Result};
use crate::file::FileList;
use crate::logger::Logger;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    All,
    Metafiles,
    Datafiles,
}

fn select_kind(list: FileList, mode: SyncMode) -> FileList {
    match mode {
        SyncMode::All => list,
        SyncMode::Metafiles => list.meta(),
        SyncMode::Datafiles => list.data(),
    }
}

/// For each candidate source file of the selected kind: skip if the
/// destination already has a same-named file that's `current_with` the
/// source; otherwise stream source -> dest, preserving the source's
/// last-modified timestamp.
pub async fn sync<A, B>(
    source: &A,
    dest: &B,
    ctx: &Context,
    logger: &Logger,
    mode: SyncMode,
    concurrency: usize,
) -> Result<()>
where
    A: Store + ?Sized,
    B: Store + ?Sized,
{
    ctx.check()?;
    let source_list = select_kind(source.search(ctx, "").await?, mode);
    let dest_list = dest.search(ctx, "").await?;
    let candidates = source_list.into_vec();

    run_bounded(ctx, concurrency, candidates, move |item_ctx, _idx, src_file| async move {
        let name = src_file.name().to_string();
        if let Some(existing) = dest_list.by_name(&name) {
            if existing.current_with(&src_file) {
                logger.verbose(format!("skipped {name}"));
                return Ok(());
            }
        }
        let mut fetched = source.get(&item_ctx, &name).await?;
        let body = fetched
            .take_body()
            .ok_or_else(|| MemoryboxError::Corrupted(format!("{name}: store returned no body")))?;
        dest.put(&item_ctx, body, &name, src_file.last_modified()).await?;
        logger.verbose(format!("synced {name}"));
        Ok(())
    })
    .await
}
