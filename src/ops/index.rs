//! Index / IndexUpdate: the canonical metafile dump and its inverse (spec
//! section 4.4).

use super::run_bounded;
use crate::context::Context;
use crate::error::{MemoryboxError, Result};
use crate::file::{meta_name_of, validate_meta, Body};
use crate::store::Store;
use chrono::Utc;
use serde_json::Value;
use std::io::Cursor;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Every metafile's raw bytes, one entry per file, in the store's
/// lexicographic listing order.
pub async fn index<S: Store + ?Sized>(store: &S, ctx: &Context, concurrency: usize) -> Result<Vec<Vec<u8>>> {
    ctx.check()?;
    let metafiles = store.search(ctx, "").await?.meta();
    store.concat(ctx, concurrency, &metafiles.names()).await
}

/// Consume `reader` line by line, each line the verbatim body of one
/// metafile (the format [`index`] produces). The metafile name is derived
/// from each line's `memorybox.file` field, not supplied by the caller.
pub async fn index_update<S, R>(store: &S, ctx: &Context, concurrency: usize, reader: R) -> Result<()>
where
    S: Store + ?Sized,
    R: AsyncBufRead + Unpin,
{
    ctx.check()?;
    let mut lines = reader.lines();
    let mut items = Vec::new();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        items.push((line_no, line));
    }

    run_bounded(ctx, concurrency, items, move |item_ctx, _idx, (line_no, line)| async move {
        let meta = validate_meta(line.as_bytes())
            .map_err(|_| MemoryboxError::InvalidInput(format!("line {line_no}: not a valid metafile")))?;
        let file_field = meta
            .get("memorybox")
            .and_then(|m| m.get("file"))
            .and_then(Value::as_str)
            .ok_or_else(|| MemoryboxError::InvalidInput(format!("line {line_no}: missing memorybox.file")))?;
        let name = meta_name_of(file_field);
        let body: Body = Box::new(Cursor::new(line.into_bytes()));
        store.put(&item_ctx, body, &name, Utc::now()).await
    })
    .await
}
