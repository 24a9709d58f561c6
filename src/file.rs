//! In-memory representation of a datafile or metafile: content hashing,
//! metafile detection, and JSON metadata accessors (spec sections 3, 4.1).

use crate::error::{MemoryboxError, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Name prefix that marks a file as a metafile.
pub const META_PREFIX: &str = "memorybox-meta-";
/// Suffix documenting the digest algorithm a datafile name encodes.
pub const DATA_SUFFIX: &str = "-sha256";
/// A metafile body larger than this is never recognized as a metafile, even
/// if it happens to be syntactically valid JSON with a `memorybox` key.
pub const METAFILE_MAX_SIZE: u64 = 256 * 1024;

/// A readable, seekable byte source. Required to be seekable because the
/// constructor rewinds it after hashing and again after metafile detection.
pub trait SeekableBody: AsyncRead + AsyncSeek + Send + Unpin {}
impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableBody for T {}

pub type Body = Box<dyn SeekableBody>;

/// `name` iff it already carries the metafile prefix, else prefixed.
pub fn meta_name_of(name: &str) -> String {
    if name.starts_with(META_PREFIX) {
        name.to_string()
    } else {
        format!("{META_PREFIX}{name}")
    }
}

/// `name` with the metafile prefix stripped, a no-op if it carries none.
pub fn data_name_of(name: &str) -> String {
    name.strip_prefix(META_PREFIX).unwrap_or(name).to_string()
}

/// A file is a metafile iff its name starts with the metafile prefix.
pub fn is_meta_name(name: &str) -> bool {
    name.starts_with(META_PREFIX)
}

/// Validate metafile content: must be at most [`METAFILE_MAX_SIZE`] bytes,
/// syntactically valid JSON, and contain a top-level `memorybox` object key.
pub fn validate_meta(bytes: &[u8]) -> Result<Value> {
    if bytes.len() as u64 > METAFILE_MAX_SIZE {
        return Err(MemoryboxError::InvalidInput(format!(
            "metafile body exceeds {METAFILE_MAX_SIZE} bytes"
        )));
    }
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| MemoryboxError::InvalidInput(format!("not valid JSON: {e}")))?;
    match value.get("memorybox") {
        Some(Value::Object(_)) => Ok(value),
        _ => Err(MemoryboxError::InvalidInput(
            "missing top-level \"memorybox\" object".to_string(),
        )),
    }
}

/// `true` if `bytes` looks like a metafile: small enough and carrying a
/// `memorybox` key. Used by the File constructor to reject metafile-shaped
/// input submitted through non-metafile-aware operations.
fn looks_like_metafile(bytes: &[u8]) -> bool {
    bytes.len() as u64 <= METAFILE_MAX_SIZE
        && serde_json::from_slice::<Value>(bytes)
            .map(|v| matches!(v.get("memorybox"), Some(Value::Object(_))))
            .unwrap_or(false)
}

/// A datafile or metafile: a name, an optional body, and provenance.
pub struct File {
    name: String,
    size: u64,
    last_modified: DateTime<Utc>,
    source: String,
    meta: Value,
    body: Option<Body>,
}

impl File {
    /// Build a File from a seekable body, computing its content-addressed
    /// name and a freshly generated metafile skeleton. Fails with
    /// `InvalidInput` if the body looks like a metafile — those must be
    /// inserted only through metafile-aware operations (sync, metaSet).
    pub async fn from_body(
        source: impl Into<String>,
        mut body: Body,
        last_modified: DateTime<Utc>,
    ) -> Result<Self> {
        let source = source.into();
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = body.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        body.seek(SeekFrom::Start(0)).await?;

        if size <= METAFILE_MAX_SIZE {
            let mut sniff = Vec::with_capacity(size as usize);
            body.read_to_end(&mut sniff).await?;
            if looks_like_metafile(&sniff) {
                return Err(MemoryboxError::InvalidInput(
                    "refusing to store metafile-shaped content as a datafile; use a metafile-aware operation".to_string(),
                ));
            }
            body.seek(SeekFrom::Start(0)).await?;
        }

        let digest = hasher.finalize();
        let name = format!("{}{DATA_SUFFIX}", hex::encode(digest));
        let meta = serde_json::json!({
            "memorybox": {
                "file": name,
                "source": source,
                "import": { "at": Utc::now().to_rfc3339() },
            }
        });

        Ok(Self {
            name,
            size,
            last_modified,
            source,
            meta,
            body: Some(body),
        })
    }

    /// A bodyless stub describing only name/size/last-modified, as produced
    /// by `Store::stat` and `Store::search`.
    pub fn stub(name: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified,
            source: String::new(),
            meta: Value::Object(Map::new()),
            body: None,
        }
    }

    /// Construct a metafile-kind File from its raw JSON body, validating it
    /// first. The body is fully materialized into `meta` — metafile callers
    /// interact through the metadata accessors, not a streaming body.
    pub fn from_meta_bytes(name: impl Into<String>, bytes: &[u8], last_modified: DateTime<Utc>) -> Result<Self> {
        let meta = validate_meta(bytes)?;
        Ok(Self {
            name: name.into(),
            size: bytes.len() as u64,
            last_modified,
            source: String::new(),
            meta,
            body: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn set_last_modified(&mut self, t: DateTime<Utc>) {
        self.last_modified = t;
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_meta(&self) -> bool {
        is_meta_name(&self.name)
    }

    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = Some(body);
    }

    pub fn body_mut(&mut self) -> Option<&mut Body> {
        self.body.as_mut()
    }

    /// Read the entire remaining body. Fails with an `UnexpectedEof` io
    /// error when called on a bodyless stub.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let body = self.body.as_mut().ok_or_else(|| {
            MemoryboxError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "file has no body",
            ))
        })?;
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    pub fn close(&mut self) {
        self.body = None;
    }

    /// Serialized form of `meta`, the bytes a metafile write installs as
    /// its body.
    pub fn meta_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.meta).expect("meta is always a valid JSON object")
    }

    pub fn meta_value(&self) -> &Value {
        &self.meta
    }

    /// Used to decide whether a sync destination (`self`) already reflects
    /// a sync source (`other`) and may be skipped.
    ///
    /// Metafiles compare size and require `self` to be at least as recent
    /// as `other`; datafiles compare size alone — content-addressed names
    /// already guarantee a size match implies a content match.
    pub fn current_with(&self, other: &File) -> bool {
        if self.size != other.size {
            return false;
        }
        if self.is_meta() {
            self.last_modified >= other.last_modified
        } else {
            true
        }
    }

    /// Get a user-owned metadata key (`None` for `memorybox*` keys, which
    /// are system-owned and not exposed through this accessor).
    pub fn get(&self, key: &str) -> Option<&Value> {
        if key.starts_with("memorybox") {
            return None;
        }
        self.meta.get(key)
    }

    /// Set a user-owned metadata key. Values are auto-converted to JSON
    /// numbers/booleans/objects/arrays when they parse as such, else stored
    /// as JSON strings. Silently ignored for `memorybox*` keys.
    pub fn set(&mut self, key: &str, value: &str) {
        if key.starts_with("memorybox") {
            return;
        }
        if let Value::Object(map) = &mut self.meta {
            map.insert(key.to_string(), coerce_value(value));
        }
    }

    /// Delete a user-owned metadata key. Silently ignored for `memorybox*`
    /// keys.
    pub fn delete(&mut self, key: &str) {
        if key.starts_with("memorybox") {
            return;
        }
        if let Value::Object(map) = &mut self.meta {
            map.remove(key);
        }
    }

    /// Set `memorybox.import.from`. System-owned, so unlike [`File::set`]
    /// this bypasses the `memorybox*` key ban — only called by the Put
    /// operation itself.
    pub(crate) fn set_import_from(&mut self, from: &str) {
        if let Value::Object(map) = &mut self.meta {
            let memorybox = map
                .entry("memorybox")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(memorybox) = memorybox {
                let import = memorybox
                    .entry("import")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(import) = import {
                    import.insert("from".to_string(), Value::String(from.to_string()));
                }
            }
        }
    }

    /// `memorybox.file` — required on every metafile.
    pub fn meta_file_field(&self) -> Option<&str> {
        self.meta.get("memorybox").and_then(|m| m.get("file")).and_then(Value::as_str)
    }

    /// `memorybox.source` — present when set at creation time.
    pub fn meta_source_field(&self) -> Option<&str> {
        self.meta.get("memorybox").and_then(|m| m.get("source")).and_then(Value::as_str)
    }

    /// Merge a JSON object into the user-owned portion of the metadata,
    /// ignoring any `memorybox*` keys it contains.
    pub fn merge(&mut self, json_object: &str) -> Result<()> {
        let incoming: Value = serde_json::from_str(json_object)
            .map_err(|e| MemoryboxError::InvalidInput(format!("invalid merge JSON: {e}")))?;
        let Value::Object(incoming) = incoming else {
            return Err(MemoryboxError::InvalidInput(
                "merge input must be a JSON object".to_string(),
            ));
        };
        if let Value::Object(map) = &mut self.meta {
            for (k, v) in incoming {
                if k.starts_with("memorybox") {
                    continue;
                }
                map.insert(k, v);
            }
        }
        Ok(())
    }
}

/// Auto-convert a CLI-supplied string value into a JSON number, boolean,
/// array/object, or (failing all of those) a plain JSON string.
fn coerce_value(value: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(value) {
        if v.is_number() || v.is_boolean() || v.is_array() || v.is_object() {
            return v;
        }
    }
    Value::String(value.to_string())
}

/// An ordered, sortable collection of files. Values, not references — every
/// filtering operation returns a new `List`.
#[derive(Default)]
pub struct FileList(Vec<File>);

impl FileList {
    pub fn new(files: Vec<File>) -> Self {
        Self(files)
    }

    pub fn into_vec(self) -> Vec<File> {
        self.0
    }

    pub fn as_slice(&self) -> &[File] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|f| f.name().to_string()).collect()
    }

    /// Only metafiles.
    pub fn meta(self) -> Self {
        Self(self.0.into_iter().filter(|f| f.is_meta()).collect())
    }

    /// Only datafiles.
    pub fn data(self) -> Self {
        Self(self.0.into_iter().filter(|f| !f.is_meta()).collect())
    }

    /// Only files whose opposite-kind pair is present in this same list.
    pub fn valid(self) -> Self {
        let names: std::collections::HashSet<String> = self.0.iter().map(|f| f.name().to_string()).collect();
        Self(
            self.0
                .into_iter()
                .filter(|f| {
                    let pair = if f.is_meta() {
                        data_name_of(f.name())
                    } else {
                        meta_name_of(f.name())
                    };
                    names.contains(&pair)
                })
                .collect(),
        )
    }

    /// Only files lacking their opposite-kind pair in this same list.
    pub fn invalid(self) -> Self {
        let names: std::collections::HashSet<String> = self.0.iter().map(|f| f.name().to_string()).collect();
        Self(
            self.0
                .into_iter()
                .filter(|f| {
                    let pair = if f.is_meta() {
                        data_name_of(f.name())
                    } else {
                        meta_name_of(f.name())
                    };
                    !names.contains(&pair)
                })
                .collect(),
        )
    }

    pub fn by_name(&self, name: &str) -> Option<&File> {
        self.0.iter().find(|f| f.name() == name)
    }

    pub fn sorted(mut self) -> Self {
        self.0.sort_by(|a, b| a.name().cmp(b.name()));
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, File> {
        self.0.iter()
    }
}

impl IntoIterator for FileList {
    type Item = File;
    type IntoIter = std::vec::IntoIter<File>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<File> for FileList {
    fn from_iter<I: IntoIterator<Item = File>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
