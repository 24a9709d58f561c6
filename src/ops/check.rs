//! Check: structural integrity audit over pairing, metafile well-formedness,
//! and datafile digest correctness (spec section 4.4).

use super::collect_bounded;
use crate::context::Context;
use crate::error::{MemoryboxError, Result};
use crate::file::{data_name_of, meta_name_of, validate_meta, DATA_SUFFIX};
use crate::logger::Logger;
use crate::store::Store;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    Pairing,
    Metafiles,
    Datafiles,
}

/// Header counts and per-category name signatures, plus the findings for
/// whichever `CheckMode` was requested. A non-empty `findings` does not mean
/// the call failed — Check reports defects, it does not repair them or
/// surface them as an `Err`.
pub struct CheckReport {
    pub total: usize,
    pub datafile_count: usize,
    pub metafile_count: usize,
    pub unpaired_count: usize,
    pub all_signature: String,
    pub datafiles_signature: String,
    pub metafiles_signature: String,
    pub unpaired_signature: String,
    /// SHA-256 of the concatenation of each metafile body's own content
    /// digest, in listing order (Glossary: "Signature ... SHA-256 of the
    /// concatenation of the names (or content digests)"). Only populated in
    /// `CheckMode::Metafiles`, since other modes don't read metafile bodies.
    pub metafiles_content_signature: Option<String>,
    pub findings: Vec<String>,
}

fn signature(names: &[String]) -> String {
    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub async fn check<S: Store + ?Sized>(
    store: &S,
    ctx: &Context,
    logger: &Logger,
    concurrency: usize,
    mode: CheckMode,
) -> Result<CheckReport> {
    ctx.check()?;
    let all = store.search(ctx, "").await?;
    let name_set: HashSet<&str> = all.as_slice().iter().map(|f| f.name()).collect();

    let mut data_names = Vec::new();
    let mut meta_names = Vec::new();
    let mut unpaired: Vec<(String, String)> = Vec::new();
    for f in all.as_slice() {
        if f.is_meta() {
            meta_names.push(f.name().to_string());
        } else {
            data_names.push(f.name().to_string());
        }
        let pair = if f.is_meta() {
            data_name_of(f.name())
        } else {
            meta_name_of(f.name())
        };
        if !name_set.contains(pair.as_str()) {
            unpaired.push((f.name().to_string(), pair));
        }
    }
    let all_names = all.names();
    let unpaired_names: Vec<String> = unpaired.iter().map(|(n, _)| n.clone()).collect();

    let mut findings = Vec::new();
    let mut metafiles_content_signature = None;
    match mode {
        CheckMode::Pairing => {
            for (name, pair) in &unpaired {
                findings.push(format!("{name}: missing {pair}"));
            }
        }
        CheckMode::Metafiles => {
            let bodies = store.concat(ctx, concurrency, &meta_names).await?;
            let mut digests = Vec::with_capacity(bodies.len());
            for (name, bytes) in meta_names.iter().zip(bodies.iter()) {
                let mut hasher = Sha256::new();
                hasher.update(bytes);
                digests.push(hex::encode(hasher.finalize()));

                match validate_meta(bytes) {
                    Ok(meta) => {
                        let file_field = meta.get("memorybox").and_then(|m| m.get("file")).and_then(Value::as_str);
                        let expected = data_name_of(name);
                        if file_field != Some(expected.as_str()) {
                            findings.push(format!("{name}: memorybox.file does not match own name"));
                        }
                    }
                    Err(e) => findings.push(format!("{name}: {e}")),
                }
            }
            metafiles_content_signature = Some(signature(&digests));
        }
        CheckMode::Datafiles => {
            let outcomes = collect_bounded(ctx, concurrency, data_names.clone(), move |item_ctx, _idx, name| async move {
                let mut file = store.get(&item_ctx, &name).await?;
                let bytes = file.read_to_end().await?;
                let mut hasher = Sha256::new();
                hasher.update(&bytes);
                let digest = format!("{}{DATA_SUFFIX}", hex::encode(hasher.finalize()));
                if digest == name {
                    Ok(())
                } else {
                    Err(MemoryboxError::Corrupted(format!("{name}: computed digest {digest}")))
                }
            })
            .await?;
            for outcome in outcomes {
                if let Err(e) = outcome {
                    findings.push(e.to_string());
                }
            }
        }
    }

    logger.out(format!(
        "total={} datafiles={} metafiles={} unpaired={}",
        all_names.len(),
        data_names.len(),
        meta_names.len(),
        unpaired_names.len()
    ));

    Ok(CheckReport {
        total: all_names.len(),
        datafile_count: data_names.len(),
        metafile_count: meta_names.len(),
        unpaired_count: unpaired_names.len(),
        all_signature: signature(&all_names),
        datafiles_signature: signature(&data_names),
        metafiles_signature: signature(&meta_names),
        unpaired_signature: signature(&unpaired_names),
        metafiles_content_signature,
        findings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::File;
    use crate::ops::put::put;
    use crate::store::local::LocalDiskStore;
    use std::io::Cursor;

    #[tokio::test]
    async fn pairing_reports_datafile_whose_metafile_was_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path()).await.unwrap();
        let ctx = Context::new();
        let logger = Logger::silent();
        let file = File::from_body("stdin", Box::new(Cursor::new(b"test".to_vec())), chrono::Utc::now())
            .await
            .unwrap();
        let data_name = file.name().to_string();
        put(&store, &ctx, file, None).await.unwrap();
        store.delete(&ctx, &meta_name_of(&data_name)).await.unwrap();

        let report = check(&store, &ctx, &logger, 4, CheckMode::Pairing).await.unwrap();
        assert_eq!(report.unpaired_count, 1);
        assert!(report.findings[0].contains(&data_name));
        assert!(report.metafiles_content_signature.is_none());

        let datafiles = check(&store, &ctx, &logger, 4, CheckMode::Datafiles).await.unwrap();
        assert!(datafiles.findings.is_empty());
        assert!(datafiles.metafiles_content_signature.is_none());
    }

    #[tokio::test]
    async fn metafiles_mode_reports_a_content_digest_signature_that_tracks_body_edits() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path()).await.unwrap();
        let ctx = Context::new();
        let logger = Logger::silent();
        let file = File::from_body("stdin", Box::new(Cursor::new(b"test".to_vec())), chrono::Utc::now())
            .await
            .unwrap();
        let data_name = file.name().to_string();
        put(&store, &ctx, file, None).await.unwrap();

        let before = check(&store, &ctx, &logger, 4, CheckMode::Metafiles).await.unwrap();
        assert!(before.findings.is_empty());
        let before_digest = before
            .metafiles_content_signature
            .expect("metafiles mode computes a content signature");
        assert_ne!(before_digest, before.metafiles_signature, "content digest differs from the name-based signature");

        // Mutating the metafile's body (without touching its name) must
        // change the content digest while the name-based signature — which
        // only ever sees the unchanged `memorybox-meta-...` name — does not.
        crate::ops::meta::meta_set(&store, &ctx, &data_name, "title", "hello").await.unwrap();
        let after = check(&store, &ctx, &logger, 4, CheckMode::Metafiles).await.unwrap();
        assert_ne!(after.metafiles_content_signature, before.metafiles_content_signature);
        assert_eq!(after.metafiles_signature, before.metafiles_signature);
    }

    #[tokio::test]
    async fn datafiles_mode_flags_digest_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path()).await.unwrap();
        let ctx = Context::new();
        let logger = Logger::silent();
        let file = File::from_body("stdin", Box::new(Cursor::new(b"test".to_vec())), chrono::Utc::now())
            .await
            .unwrap();
        let data_name = file.name().to_string();
        put(&store, &ctx, file, None).await.unwrap();

        // Corrupt the stored datafile body in place.
        let path = dir.path().join(&data_name);
        tokio::fs::write(&path, b"corrupted").await.unwrap();

        let report = check(&store, &ctx, &logger, 4, CheckMode::Datafiles).await.unwrap();
        assert_eq!(report.findings.len(), 1);
    }
}
