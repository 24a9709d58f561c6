//! Local-disk storage backend: one directory, one sibling file per artifact

use super::Store;
use crate::context::{bounded_for_each, Context};
use crate::error::{MemoryboxError, Result};
use crate::file::{Body, File, FileList};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, instrument};

fn io_not_found(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::NotFound
}

/// A single flat directory; artifacts are plain sibling files named exactly
/// by their archive name (spec section 6, "Storage layout (local disk)").
pub struct LocalDiskStore {
    root: PathBuf,
}

impl LocalDiskStore {
    /// Create (if needed, mode 0755) the root directory and open it as a
    /// store.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            let _ = fs::set_permissions(&root, perms).await;
        }
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write-to-temp + fsync + rename, so a failure partway through never
    /// leaves a partial artifact observable under `name`.
    async fn atomic_write(&self, name: &str, data: Vec<u8>) -> Result<()> {
        let root = self.root.clone();
        let dest = self.path_for(name);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = NamedTempFile::new_in(&root)?;
            tmp.write_all(&data)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&dest).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| MemoryboxError::Backend(format!("join error: {e}")))??;
        Ok(())
    }
}

#[async_trait]
impl Store for LocalDiskStore {
    #[instrument(skip(self, body))]
    async fn put(&self, ctx: &Context, mut body: Body, name: &str, last_modified: DateTime<Utc>) -> Result<()> {
        ctx.check()?;
        use tokio::io::AsyncReadExt;
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        let len = data.len();
        self.atomic_write(name, data).await?;
        let path = self.path_for(name);
        let ft = filetime::FileTime::from_unix_time(last_modified.timestamp(), 0);
        let path_clone = path.clone();
        tokio::task::spawn_blocking(move || filetime::set_file_mtime(&path_clone, ft))
            .await
            .map_err(|e| MemoryboxError::Backend(format!("join error: {e}")))??;
        debug!("wrote {} ({} bytes) to {:?}", name, len, path);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, ctx: &Context, name: &str) -> Result<File> {
        ctx.check()?;
        let path = self.path_for(name);
        let handle = fs::File::open(&path).await.map_err(|e| {
            if io_not_found(&e) {
                MemoryboxError::NotFound(name.to_string())
            } else {
                MemoryboxError::Io(e)
            }
        })?;
        let meta = handle.metadata().await?;
        let last_modified = mtime_of(&meta);
        let mut file = File::stub(name, meta.len(), last_modified);
        file.set_body(Box::new(handle));
        Ok(file)
    }

    #[instrument(skip(self))]
    async fn stat(&self, ctx: &Context, name: &str) -> Result<File> {
        ctx.check()?;
        let path = self.path_for(name);
        let meta = fs::metadata(&path).await.map_err(|e| {
            if io_not_found(&e) {
                MemoryboxError::NotFound(name.to_string())
            } else {
                MemoryboxError::Io(e)
            }
        })?;
        Ok(File::stub(name, meta.len(), mtime_of(&meta)))
    }

    #[instrument(skip(self))]
    async fn delete(&self, ctx: &Context, name: &str) -> Result<()> {
        ctx.check()?;
        let path = self.path_for(name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if io_not_found(&e) => Ok(()),
            Err(e) => Err(MemoryboxError::Io(e)),
        }
    }

    #[instrument(skip(self))]
    async fn search(&self, ctx: &Context, prefix: &str) -> Result<FileList> {
        ctx.check()?;
        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            return Ok(FileList::default());
        }
        let mut entries = fs::read_dir(&self.root).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            ctx.check()?;
            let ft = entry.file_type().await?;
            if !ft.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with(prefix) {
                continue;
            }
            let meta = entry.metadata().await?;
            files.push(File::stub(name, meta.len(), mtime_of(&meta)));
        }
        Ok(FileList::new(files).sorted())
    }

    #[instrument(skip(self))]
    async fn concat(&self, ctx: &Context, concurrency: usize, names: &[String]) -> Result<Vec<Vec<u8>>> {
        ctx.check()?;
        let root = Arc::new(self.root.clone());
        let results: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(vec![Vec::new(); names.len()]));
        let items: Vec<String> = names.to_vec();
        let results_clone = results.clone();
        bounded_for_each(ctx, concurrency, items, move |item_ctx, idx, name| {
            let root = root.clone();
            let results = results_clone.clone();
            async move {
                item_ctx.check()?;
                let path = root.join(&name);
                let data = fs::read(&path).await.map_err(|e| {
                    if io_not_found(&e) {
                        MemoryboxError::NotFound(name.clone())
                    } else {
                        MemoryboxError::Io(e)
                    }
                })?;
                results.lock()[idx] = data;
                Ok(())
            }
        })
        .await?;
        Ok(Arc::try_unwrap(results).map(Mutex::into_inner).unwrap_or_default())
    }

    fn label(&self) -> String {
        format!("local:{}", self.root.display())
    }
}

fn mtime_of(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| Utc.timestamp_opt(d.as_secs() as i64, d.subsec_nanos()).single())
        .unwrap_or_else(Utc::now)
}
