//! Pluggable storage backend contract (spec section 4.2)

pub mod local;
pub mod object;

use crate::context::Context;
use crate::error::Result;
use crate::file::{Body, File, FileList};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Uniform contract implemented by every backend. Every operation takes a
/// cancellable context; implementations must be safe to share across
/// concurrent callers (spec section 5, "Resource policy").
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically install `name` ← `body`, exposing `last_modified` on
    /// subsequent `stat`. On failure partway through, the partial artifact
    /// must not be observable by later operations on the same name.
    async fn put(&self, ctx: &Context, body: Body, name: &str, last_modified: DateTime<Utc>) -> Result<()>;

    /// Retrieve `name` with an open body. Caller must close it.
    async fn get(&self, ctx: &Context, name: &str) -> Result<File>;

    /// Cheap existence+metadata probe; no body attached.
    async fn stat(&self, ctx: &Context, name: &str) -> Result<File>;

    /// Remove `name`. Silent if already absent.
    async fn delete(&self, ctx: &Context, name: &str) -> Result<()>;

    /// Lexicographically sorted listing of every name starting with
    /// `prefix` (empty prefix ⇒ full listing). Nonexistent prefix returns
    /// an empty list, not `NotFound`.
    async fn search(&self, ctx: &Context, prefix: &str) -> Result<FileList>;

    /// Bulk-load small files (metafiles) with bounded parallelism,
    /// preserving input order in the result.
    async fn concat(&self, ctx: &Context, concurrency: usize, names: &[String]) -> Result<Vec<Vec<u8>>>;

    /// Human-identifiable name for diagnostics.
    fn label(&self) -> String;
}

/// Blanket forwarding impl so `Box<dyn Store>` itself implements `Store`,
/// letting callers hold a dynamically-selected backend without an extra
/// wrapper type.
#[async_trait]
impl Store for Box<dyn Store> {
    async fn put(&self, ctx: &Context, body: Body, name: &str, last_modified: DateTime<Utc>) -> Result<()> {
        (**self).put(ctx, body, name, last_modified).await
    }

    async fn get(&self, ctx: &Context, name: &str) -> Result<File> {
        (**self).get(ctx, name).await
    }

    async fn stat(&self, ctx: &Context, name: &str) -> Result<File> {
        (**self).stat(ctx, name).await
    }

    async fn delete(&self, ctx: &Context, name: &str) -> Result<()> {
        (**self).delete(ctx, name).await
    }

    async fn search(&self, ctx: &Context, prefix: &str) -> Result<FileList> {
        (**self).search(ctx, prefix).await
    }

    async fn concat(&self, ctx: &Context, concurrency: usize, names: &[String]) -> Result<Vec<Vec<u8>>> {
        (**self).concat(ctx, concurrency, names).await
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

/// Same forwarding, for callers that need to share a backend across spawned
/// tasks (Import's fetch fan-out) rather than simply own it.
#[async_trait]
impl Store for std::sync::Arc<dyn Store> {
    async fn put(&self, ctx: &Context, body: Body, name: &str, last_modified: DateTime<Utc>) -> Result<()> {
        (**self).put(ctx, body, name, last_modified).await
    }

    async fn get(&self, ctx: &Context, name: &str) -> Result<File> {
        (**self).get(ctx, name).await
    }

    async fn stat(&self, ctx: &Context, name: &str) -> Result<File> {
        (**self).stat(ctx, name).await
    }

    async fn delete(&self, ctx: &Context, name: &str) -> Result<()> {
        (**self).delete(ctx, name).await
    }

    async fn search(&self, ctx: &Context, prefix: &str) -> Result<FileList> {
        (**self).search(ctx, prefix).await
    }

    async fn concat(&self, ctx: &Context, concurrency: usize, names: &[String]) -> Result<Vec<Vec<u8>>> {
        (**self).concat(ctx, concurrency, names).await
    }

    fn label(&self) -> String {
        (**self).label()
    }
}
