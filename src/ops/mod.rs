//! The archive operations (spec section 4.4), each a thin function over
//! `Store` plus the shared prefix-resolution and bounded-concurrency helpers
//! below.

pub mod check;
pub mod delete;
pub mod diff;
pub mod get;
pub mod import;
pub mod index;
pub mod meta;
pub mod put;
pub mod sync;

use crate::context::Context;
use crate::error::{MemoryboxError, Result};
use crate::file::meta_name_of;
use crate::store::Store;
use std::future::Future;

/// Resolve a user-supplied reference (typically a digest prefix) to exactly
/// one stored name. `only_meta` searches for the reference's metafile
/// counterpart (`memorybox-meta-<prefix>`) instead of the datafile itself —
/// the naming scheme keeps the two searches from ever colliding.
pub(crate) async fn resolve_one<S>(store: &S, ctx: &Context, reference: &str, only_meta: bool) -> Result<String>
where
    S: Store + ?Sized,
{
    ctx.check()?;
    let prefix = if only_meta { meta_name_of(reference) } else { reference.to_string() };
    let matches = store.search(ctx, &prefix).await?;
    match matches.len() {
        0 => Err(MemoryboxError::NotFound(reference.to_string())),
        1 => Ok(matches.as_slice()[0].name().to_string()),
        count => Err(MemoryboxError::Ambiguous {
            prefix: reference.to_string(),
            count,
        }),
    }
}

/// Drive `items` through `f` with parallelism bounded by `concurrency`,
/// short-circuiting on the first error. Unlike [`crate::context::TaskGroup`],
/// this never spawns a separate task — every future is polled inline by the
/// caller's own task — so it places no `Send + 'static` requirement on `f`
/// and works with a borrowed `&dyn Store` whose lifetime the ops functions
/// don't own. Fetch's fan-out (which does own its inputs) still uses the
/// spawn-based `bounded_for_each`.
pub(crate) async fn run_bounded<T, F, Fut>(ctx: &Context, concurrency: usize, items: Vec<T>, f: F) -> Result<()>
where
    F: Fn(Context, usize, T) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    use futures::stream::{self, StreamExt, TryStreamExt};
    ctx.check()?;
    stream::iter(items.into_iter().enumerate())
        .map(|(idx, item)| {
            let item_ctx = ctx.clone();
            async move {
                item_ctx.check()?;
                f(item_ctx, idx, item).await
            }
        })
        .buffer_unordered(concurrency.max(1))
        .try_for_each(|_| futures::future::ready(Ok(())))
        .await
}

/// Same shape as [`run_bounded`], but collects every outcome instead of
/// aborting on the first error — used by `Check`, which audits every file
/// and reports every failure rather than stopping at one. A genuine
/// cancellation still aborts immediately.
pub(crate) async fn collect_bounded<T, R, F, Fut>(
    ctx: &Context,
    concurrency: usize,
    items: Vec<T>,
    f: F,
) -> Result<Vec<Result<R>>>
where
    F: Fn(Context, usize, T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    use futures::stream::{self, StreamExt};
    ctx.check()?;
    let mut stream = stream::iter(items.into_iter().enumerate())
        .map(|(idx, item)| {
            let item_ctx = ctx.clone();
            async move {
                item_ctx.check()?;
                f(item_ctx, idx, item).await
            }
        })
        .buffer_unordered(concurrency.max(1));

    let mut results = Vec::new();
    while let Some(outcome) = stream.next().await {
        if let Err(MemoryboxError::Cancelled) = &outcome {
            return Err(MemoryboxError::Cancelled);
        }
        results.push(outcome);
    }
    Ok(results)
}
