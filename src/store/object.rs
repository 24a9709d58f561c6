//! S3-compatible object store backend
//!
//! Many S3-compatible systems forbid a client-set `LastModified`, so the
//! true timestamp is persisted as user metadata (`memorybox.LastModified`,
//! RFC3339 UTC) and preferred on read, restoring the uniform semantics
//! `File::current_with` relies on (spec section 4.2, "Object store").

use super::Store;
use crate::context::{bounded_for_each, Context};
use crate::error::{MemoryboxError, Result};
use crate::file::{Body, File, FileList};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, instrument};

/// User metadata key carrying the caller-set last-modified timestamp.
const LAST_MODIFIED_KEY: &str = "memorybox.LastModified";

/// Connection parameters for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub force_path_style: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    pub async fn new(config: &ObjectStoreConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            let credentials = Credentials::new(key_id, secret, None, None, "memorybox-config");
            loader = loader.credentials_provider(credentials);
        }
        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();
        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        })
    }

    fn is_not_found(err: &SdkError<aws_sdk_s3::operation::get_object::GetObjectError>) -> bool {
        matches!(
            err,
            SdkError::ServiceError(e) if matches!(
                e.err(),
                aws_sdk_s3::operation::get_object::GetObjectError::NoSuchKey(_)
            )
        )
    }

    async fn put_raw(&self, key: &str, data: Vec<u8>, last_modified: DateTime<Utc>) -> Result<()> {
        let mut metadata = HashMap::new();
        metadata.insert(LAST_MODIFIED_KEY.to_string(), last_modified.to_rfc3339());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_metadata(Some(metadata))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| MemoryboxError::Backend(format!("put_object {key} failed: {e}")))?;
        Ok(())
    }

    async fn get_raw(&self, key: &str) -> Result<(Vec<u8>, u64, DateTime<Utc>)> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if Self::is_not_found(&e) {
                    MemoryboxError::NotFound(key.to_string())
                } else {
                    MemoryboxError::Backend(format!("get_object {key} failed: {e}"))
                }
            })?;

        let last_modified = preferred_last_modified(response.metadata(), response.last_modified());
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| MemoryboxError::Backend(format!("reading body of {key}: {e}")))?
            .into_bytes()
            .to_vec();
        let size = data.len() as u64;
        Ok((data, size, last_modified))
    }
}

fn preferred_last_modified(
    metadata: Option<&HashMap<String, String>>,
    server_last_modified: Option<&aws_sdk_s3::primitives::DateTime>,
) -> DateTime<Utc> {
    metadata
        .and_then(|m| m.get(LAST_MODIFIED_KEY))
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .or_else(|| {
            server_last_modified.and_then(|t| {
                DateTime::from_timestamp(t.secs(), t.subsec_nanos())
            })
        })
        .unwrap_or_else(Utc::now)
}

#[async_trait]
impl Store for ObjectStore {
    #[instrument(skip(self, body))]
    async fn put(&self, ctx: &Context, mut body: Body, name: &str, last_modified: DateTime<Utc>) -> Result<()> {
        ctx.check()?;
        use tokio::io::AsyncReadExt;
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        self.put_raw(name, data, last_modified).await?;
        debug!("S3 PUT {}", name);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, ctx: &Context, name: &str) -> Result<File> {
        ctx.check()?;
        let (data, size, last_modified) = self.get_raw(name).await?;
        let mut file = File::stub(name, size, last_modified);
        file.set_body(Box::new(Cursor::new(data)));
        Ok(file)
    }

    #[instrument(skip(self))]
    async fn stat(&self, ctx: &Context, name: &str) -> Result<File> {
        ctx.check()?;
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("NotFound") || msg.contains("404") {
                    MemoryboxError::NotFound(name.to_string())
                } else {
                    MemoryboxError::Backend(format!("head_object {name} failed: {e}"))
                }
            })?;
        let size = response.content_length().unwrap_or(0).max(0) as u64;
        let last_modified = preferred_last_modified(response.metadata(), response.last_modified());
        Ok(File::stub(name, size, last_modified))
    }

    #[instrument(skip(self))]
    async fn delete(&self, ctx: &Context, name: &str) -> Result<()> {
        ctx.check()?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| MemoryboxError::Backend(format!("delete_object {name} failed: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn search(&self, ctx: &Context, prefix: &str) -> Result<FileList> {
        ctx.check()?;
        // v1 List API (for DigitalOcean Spaces compatibility), 1,000-key pages.
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            ctx.check()?;
            let mut req = self.client.list_objects().bucket(&self.bucket).prefix(prefix).max_keys(1000);
            if let Some(m) = &marker {
                req = req.marker(m);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| MemoryboxError::Backend(format!("list_objects failed: {e}")))?;
            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }
            if resp.is_truncated().unwrap_or(false) {
                marker = resp.contents().last().and_then(|o| o.key().map(str::to_string));
                if marker.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        // HEAD each key so listing honors the same preferred-timestamp rule
        // as get/stat — needed for `current_with` to be meaningful from
        // search results alone (e.g. Sync's destination index).
        let store = Arc::new(self.client.clone());
        let bucket = self.bucket.clone();
        let results: Arc<Mutex<Vec<Option<File>>>> = Arc::new(Mutex::new((0..keys.len()).map(|_| None).collect()));
        let results_clone = results.clone();
        bounded_for_each(ctx, 16, keys, move |item_ctx, idx, key| {
            let client = store.clone();
            let bucket = bucket.clone();
            let results = results_clone.clone();
            async move {
                item_ctx.check()?;
                let resp = client
                    .head_object()
                    .bucket(&bucket)
                    .key(&key)
                    .send()
                    .await
                    .map_err(|e| MemoryboxError::Backend(format!("head_object {key} failed: {e}")))?;
                let size = resp.content_length().unwrap_or(0).max(0) as u64;
                let last_modified = preferred_last_modified(resp.metadata(), resp.last_modified());
                results.lock()[idx] = Some(File::stub(key, size, last_modified));
                Ok(())
            }
        })
        .await?;

        let files: Vec<File> = Arc::try_unwrap(results)
            .map(Mutex::into_inner)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect();
        Ok(FileList::new(files).sorted())
    }

    #[instrument(skip(self))]
    async fn concat(&self, ctx: &Context, concurrency: usize, names: &[String]) -> Result<Vec<Vec<u8>>> {
        ctx.check()?;
        let client = Arc::new(self.client.clone());
        let bucket = self.bucket.clone();
        let results: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(vec![Vec::new(); names.len()]));
        let items: Vec<String> = names.to_vec();
        let results_clone = results.clone();
        bounded_for_each(ctx, concurrency, items, move |item_ctx, idx, name| {
            let client = client.clone();
            let bucket = bucket.clone();
            let results = results_clone.clone();
            async move {
                item_ctx.check()?;
                let resp = client
                    .get_object()
                    .bucket(&bucket)
                    .key(&name)
                    .send()
                    .await
                    .map_err(|e| MemoryboxError::Backend(format!("get_object {name} failed: {e}")))?;
                let data = resp
                    .body
                    .collect()
                    .await
                    .map_err(|e| MemoryboxError::Backend(format!("reading body of {name}: {e}")))?
                    .into_bytes()
                    .to_vec();
                results.lock()[idx] = data;
                Ok(())
            }
        })
        .await?;
        Ok(Arc::try_unwrap(results).map(Mutex::into_inner).unwrap_or_default())
    }

    fn label(&self) -> String {
        format!("s3:{}", self.bucket)
    }
}
