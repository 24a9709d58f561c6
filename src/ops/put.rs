//! Put: write a datafile and its metafile as one idempotent, concurrent pair
//! (spec section 4.4).

use crate::context::Context;
use crate::error::{MemoryboxError, Result};
use crate::file::{meta_name_of, Body, File};
use crate::store::Store;
use std::io::Cursor;

/// `libc::gethostname`, the OS-hostname fallback for `import.from` when the
/// caller passes no explicit source name.
fn os_hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: `buf` is a valid, initialized, 256-byte stack buffer and `buf.len()`
    // is its exact size, so `gethostname` cannot write past it; a non-zero
    // return is handled below without reading `buf`'s (possibly untouched)
    // contents any further.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return String::new();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn default_import_from(import_set: Option<&str>) -> String {
    if let Some(s) = import_set {
        if !s.is_empty() {
            return s.to_string();
        }
    }
    let host = os_hostname();
    if host.is_empty() {
        "unknown".to_string()
    } else {
        host
    }
}

/// Write `file`'s body and metafile. Concurrently: the datafile is written
/// only if absent or its size differs from `file`'s (same size is treated as
/// already-present and skipped — content-addressed names make a byte
/// comparison redundant); the metafile is written only if absent, else the
/// call fails with `AlreadyExists` carrying the existing metafile bytes so
/// the caller (Import, or an interactive `put`) can decide whether to
/// surface it.
pub async fn put<S: Store + ?Sized>(
    store: &S,
    ctx: &Context,
    mut file: File,
    import_set: Option<&str>,
) -> Result<()> {
    ctx.check()?;

    let data_name = file.name().to_string();
    let meta_name = meta_name_of(&data_name);
    let last_modified = file.last_modified();
    let size = file.size();
    let body = file
        .take_body()
        .ok_or_else(|| MemoryboxError::InvalidInput("put requires a file with a body".to_string()))?;

    let from = default_import_from(import_set);
    file.set_import_from(&from);
    let meta_bytes = file.meta_bytes();

    let write_data = async move {
        match store.stat(ctx, &data_name).await {
            Ok(existing) if existing.size() == size => Ok(()),
            Ok(_) => store.put(ctx, body, &data_name, last_modified).await,
            Err(e) if e.is_not_found() => store.put(ctx, body, &data_name, last_modified).await,
            Err(e) => Err(e),
        }
    };

    let write_meta = async move {
        match store.stat(ctx, &meta_name).await {
            Ok(_) => {
                let mut existing = store.get(ctx, &meta_name).await?;
                let existing_meta = existing.read_to_end().await?;
                Err(MemoryboxError::AlreadyExists {
                    name: meta_name.clone(),
                    existing_meta,
                })
            }
            Err(e) if e.is_not_found() => {
                let body: Body = Box::new(Cursor::new(meta_bytes));
                store.put(ctx, body, &meta_name, chrono::Utc::now()).await
            }
            Err(e) => Err(e),
        }
    };

    tokio::try_join!(write_data, write_meta)?;
    Ok(())
}
