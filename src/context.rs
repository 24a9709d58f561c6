//! Cancellable context and bounded concurrent task groups
//!
//! Every long-running operation in this crate is a task group: a context
//! derived from the caller, children racing to completion, a weighted
//! semaphore bounding parallelism, and first-error-wins semantics where a
//! child failure cancels its siblings. See spec section 5.

use crate::error::{MemoryboxError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A cancellable context, the way a caller-supplied `context.Context` is
/// threaded through every operation in the original design.
#[derive(Clone)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    /// A fresh root context, not derived from anything.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Derive a child context. Cancelling the child never cancels the
    /// parent; cancelling the parent (or an ancestor) always cancels the
    /// child.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once this context (or an ancestor) is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// `Ok(())` if not cancelled, else `Err(Cancelled)` — the suspension-point
    /// check every blocking call in an operation performs before doing work.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MemoryboxError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Default bounded-parallelism ceiling used when a caller does not specify
/// one explicitly.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// A cancellable group of concurrent tasks bounded by a weighted semaphore.
///
/// `wait()` returns the first child error (if any), after which the
/// context has already been cancelled so the remaining children terminate
/// cooperatively. A cancellation-induced error is demoted in favor of a
/// real error that arrived first — `wait()` keeps only the first error it
/// observes and `spawn`'s cancellation checks prevent new cancellation
/// errors from racing ahead of one already recorded.
pub struct TaskGroup {
    ctx: Context,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<Result<()>>,
}

impl TaskGroup {
    pub fn new(ctx: &Context, concurrency: usize) -> Self {
        Self {
            ctx: ctx.child(),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// The derived context tasks in this group should observe for
    /// cancellation.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Spawn a unit of work. The future receives no arguments; callers
    /// close over whatever per-item state they need, including `self.ctx`
    /// via `TaskGroup::context()`.
    pub fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        self.tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| MemoryboxError::Cancelled)?;
            fut.await
        });
    }

    /// Wait for every spawned task, returning the first error encountered
    /// (cancelling the group's context as soon as one is found).
    pub async fn wait(mut self) -> Result<()> {
        let mut first_err: Option<MemoryboxError> = None;
        while let Some(joined) = self.tasks.join_next().await {
            let result = match joined {
                Ok(r) => r,
                Err(join_err) if join_err.is_cancelled() => continue,
                Err(join_err) => Err(MemoryboxError::Backend(format!("task panicked: {join_err}"))),
            };
            if let Err(e) = result {
                if first_err.is_none() {
                    self.ctx.cancel();
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Run `f` over every item in `items` with parallelism bounded by
/// `concurrency`, passing each item's index so callers can correlate
/// per-item side data, cancelling all siblings on the first error.
pub async fn bounded_for_each<T, F, Fut>(
    ctx: &Context,
    concurrency: usize,
    items: Vec<T>,
    f: F,
) -> Result<()>
where
    T: Send + 'static,
    F: Fn(Context, usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let f = Arc::new(f);
    let mut group = TaskGroup::new(ctx, concurrency);
    for (index, item) in items.into_iter().enumerate() {
        let f = f.clone();
        let item_ctx = group.context().clone();
        group.spawn(async move {
            item_ctx.check()?;
            f(item_ctx, index, item).await
        });
    }
    group.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn bounded_for_each_runs_every_item() {
        let ctx = Context::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..20).collect();
        let counter_clone = counter.clone();
        bounded_for_each(&ctx, 4, items, move |_ctx, _idx, _item| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn bounded_for_each_cancels_siblings_on_first_error() {
        let ctx = Context::new();
        let items: Vec<usize> = (0..10).collect();
        let completed = Arc::new(AtomicUsize::new(0));
        let completed_clone = completed.clone();
        let result = bounded_for_each(&ctx, 1, items, move |item_ctx, idx, _item| {
            let completed = completed_clone.clone();
            async move {
                if idx == 2 {
                    return Err(MemoryboxError::InvalidInput("boom".into()));
                }
                item_ctx.check()?;
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
        assert!(result.is_err());
        // with concurrency 1, indices run roughly in order; some work happens
        // before the failing item but everything after it is cancelled.
        assert!(completed.load(Ordering::SeqCst) < 10);
    }
}
