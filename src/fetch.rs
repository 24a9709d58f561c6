//! Normalize opaque input tokens (path, URL, `-`, directory) into File
//! values, with bounded concurrent fan-out (spec section 4.3).

use crate::context::{bounded_for_each, Context};
use crate::error::{MemoryboxError, Result};
use crate::file::{Body, File};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, AsyncWriteExt, ReadBuf};
use tracing::debug;

/// Maximum HTTP GET attempts before a transient network failure becomes a
/// permanent `Backend` error.
const MAX_HTTP_ATTEMPTS: u32 = 4;
const INITIAL_BACKOFF_MS: u64 = 200;

/// One normalized input token.
enum Token {
    Stdin,
    Url(String),
    Path(PathBuf),
}

fn classify(token: &str) -> Token {
    if token == "-" {
        return Token::Stdin;
    }
    if let Ok(url) = reqwest::Url::parse(token) {
        let scheme_is_http = matches!(url.scheme(), "http" | "https");
        if scheme_is_http && url.host().is_some() {
            return Token::Url(token.to_string());
        }
    }
    Token::Path(PathBuf::from(token))
}

/// A temp-file-backed body that deletes its file once dropped — the
/// lifetime of the buffering temp file Fetch creates for stdin/URL
/// sources (spec section 4.3).
struct TempBody {
    file: tokio::fs::File,
    _guard: tempfile::TempPath,
}

impl AsyncRead for TempBody {
    fn poll_read(self: Pin<&mut Self>, cx: &mut TaskContext<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.file).poll_read(cx, buf)
    }
}

impl AsyncSeek for TempBody {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
        let this = self.get_mut();
        Pin::new(&mut this.file).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<u64>> {
        let this = self.get_mut();
        Pin::new(&mut this.file).poll_complete(cx)
    }
}

async fn buffer_to_temp_file(mut reader: impl AsyncRead + Unpin) -> Result<Body> {
    let tmp = NamedTempFile::new().map_err(MemoryboxError::Io)?;
    let (std_file, path) = tmp.into_parts();
    let mut file = tokio::fs::File::from_std(std_file);
    tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;
    file.seek(SeekFrom::Start(0)).await?;
    Ok(Box::new(TempBody { file, _guard: path }))
}

async fn fetch_stdin() -> Result<File> {
    let stdin = tokio::io::stdin();
    let body = buffer_to_temp_file(stdin).await?;
    File::from_body("stdin", body, Utc::now()).await
}

async fn fetch_url(http: &reqwest::Client, url: &str) -> Result<File> {
    let mut attempt = 0;
    let mut backoff = INITIAL_BACKOFF_MS;
    loop {
        attempt += 1;
        match http.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                let last_modified = response
                    .headers()
                    .get(reqwest::header::LAST_MODIFIED)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);
                let stream = response
                    .bytes_stream()
                    .map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
                let reader = tokio_util::io::StreamReader::new(stream);
                let body = buffer_to_temp_file(reader).await?;
                return File::from_body(url, body, last_modified).await;
            }
            Ok(response) if attempt >= MAX_HTTP_ATTEMPTS => {
                return Err(MemoryboxError::Backend(format!(
                    "GET {url} failed after {attempt} attempts: HTTP {}",
                    response.status()
                )));
            }
            Err(e) if attempt >= MAX_HTTP_ATTEMPTS => {
                return Err(MemoryboxError::Backend(format!(
                    "GET {url} failed after {attempt} attempts: {e}"
                )));
            }
            _ => {
                debug!("GET {} attempt {} failed, retrying in {}ms", url, attempt, backoff);
                tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                backoff *= 2;
            }
        }
    }
}

async fn fetch_path(path: &Path) -> Result<File> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MemoryboxError::NotFound(path.display().to_string())
        } else {
            MemoryboxError::Io(e)
        }
    })?;
    let last_modified = meta
        .modified()
        .ok()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(Utc::now);
    let handle = tokio::fs::File::open(path).await?;
    let body: Body = Box::new(handle);
    File::from_body(path.display().to_string(), body, last_modified).await
}

/// Fetch a single token (stdin, URL, or local file path — directories must
/// already be expanded by [`expand_tokens`]).
pub async fn fetch_one(http: &reqwest::Client, token: &str) -> Result<File> {
    match classify(token) {
        Token::Stdin => fetch_stdin().await,
        Token::Url(url) => fetch_url(http, &url).await,
        Token::Path(path) => fetch_path(&path).await,
    }
}

/// Expand every directory token (recursively, sequentially) into its leaf
/// files; non-directory tokens pass through unchanged.
pub async fn expand_tokens(tokens: Vec<String>) -> Result<Vec<String>> {
    let mut expanded = Vec::with_capacity(tokens.len());
    for token in tokens {
        match classify(&token) {
            Token::Path(path) if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) => {
                for entry in walkdir::WalkDir::new(&path).into_iter().filter_map(|e| e.ok()) {
                    if entry.file_type().is_file() {
                        expanded.push(entry.path().display().to_string());
                    }
                }
            }
            _ => expanded.push(token),
        }
    }
    Ok(expanded)
}

/// Fetch every token with parallelism bounded by `concurrency`, invoking
/// `handler(ctx, index, file)` for each. `index` preserves input position
/// (post-expansion) so callers needing per-item side data (e.g. Import's
/// manifest metadata) can correlate. On any handler error, the derived
/// context is cancelled and the first error propagates.
pub async fn fetch_many<F, Fut>(
    ctx: &Context,
    http: reqwest::Client,
    tokens: Vec<String>,
    concurrency: usize,
    handler: F,
) -> Result<()>
where
    F: Fn(Context, usize, File) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let expanded = expand_tokens(tokens).await?;
    let http = std::sync::Arc::new(http);
    let handler = std::sync::Arc::new(handler);
    bounded_for_each(ctx, concurrency, expanded, move |item_ctx, index, token| {
        let http = http.clone();
        let handler = handler.clone();
        async move {
            item_ctx.check()?;
            let file = fetch_one(&http, &token).await?;
            handler(item_ctx, index, file).await
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_dash_is_stdin() {
        assert!(matches!(classify("-"), Token::Stdin));
    }

    #[test]
    fn classify_url_requires_host() {
        assert!(matches!(classify("https://example.com/a"), Token::Url(_)));
        assert!(matches!(classify("not-a-url"), Token::Path(_)));
        assert!(matches!(classify("./relative/path"), Token::Path(_)));
    }

    #[tokio::test]
    async fn fetch_path_hashes_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        tokio::fs::write(&file_path, b"test").await.unwrap();
        let mut file = fetch_path(&file_path).await.unwrap();
        assert_eq!(
            file.name(),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08-sha256"
        );
        assert_eq!(file.read_to_end().await.unwrap(), b"test");
    }

    #[tokio::test]
    async fn expand_tokens_flattens_directories() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"a").await.unwrap();
        let sub = dir.path().join("sub");
        tokio::fs::create_dir(&sub).await.unwrap();
        tokio::fs::write(sub.join("b.txt"), b"b").await.unwrap();

        let expanded = expand_tokens(vec![dir.path().display().to_string()]).await.unwrap();
        assert_eq!(expanded.len(), 2);
    }
}
