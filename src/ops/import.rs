//! Import: manifest-driven bulk ingest, deduplicated against existing store
//! state and idempotent across repeated runs (spec section 4.4).

use crate::context::Context;
use crate::error::{MemoryboxError, Result};
use crate::fetch;
use crate::file::validate_meta;
use crate::logger::Logger;
use crate::ops::put::put;
use crate::store::Store;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

struct ManifestLine {
    token: String,
    metadata: Option<String>,
}

/// `<token><SP><optional JSON object>` per line; blank lines are skipped.
fn parse_manifest(text: &str) -> Vec<ManifestLine> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| match line.split_once(' ') {
            Some((token, rest)) if !rest.trim().is_empty() => ManifestLine {
                token: token.to_string(),
                metadata: Some(rest.trim().to_string()),
            },
            _ => ManifestLine {
                token: line.to_string(),
                metadata: None,
            },
        })
        .collect()
}

/// `store` is an `Arc` (not a borrowed reference, unlike the other ops)
/// because Import's fan-out goes through Fetch's spawn-based task group,
/// which requires its handler — and everything it closes over — to be
/// `'static`.
pub async fn import(
    store: Arc<dyn Store>,
    ctx: &Context,
    logger: &Logger,
    http: reqwest::Client,
    concurrency: usize,
    set_name: &str,
    manifest_text: &str,
) -> Result<()> {
    ctx.check()?;

    let all = store.search(ctx, "").await?;
    let valid_meta_names = all.valid().meta().names();
    let meta_bodies = store.concat(ctx, concurrency, &valid_meta_names).await?;
    let mut existing_sources: HashSet<String> = HashSet::new();
    for bytes in &meta_bodies {
        if let Ok(meta) = validate_meta(bytes) {
            if let Some(source) = meta.get("memorybox").and_then(|m| m.get("source")).and_then(Value::as_str) {
                existing_sources.insert(source.to_string());
            }
        }
    }

    let mut by_token: HashMap<String, Option<String>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut duplicates_removed = 0usize;
    let mut existing_removed = 0usize;
    for line in parse_manifest(manifest_text) {
        if existing_sources.contains(&line.token) {
            existing_removed += 1;
            continue;
        }
        match by_token.get(&line.token) {
            None => {
                by_token.insert(line.token.clone(), line.metadata.clone());
                order.push(line.token);
            }
            Some(existing) if *existing == line.metadata => {
                duplicates_removed += 1;
            }
            Some(_) => {
                return Err(MemoryboxError::InvalidInput(format!(
                    "manifest line for {:?} carries metadata conflicting with an earlier line",
                    line.token
                )));
            }
        }
    }

    logger.out(format!(
        "import {set_name}: {} queued, {duplicates_removed} duplicates removed, {existing_removed} existing removed",
        order.len()
    ));

    let tokens = order.clone();
    let set_name = set_name.to_string();
    let by_token = Arc::new(by_token);
    let order = Arc::new(order);

    fetch::fetch_many(ctx, http, tokens, concurrency, move |item_ctx, idx, mut file| {
        let store = store.clone();
        let by_token = by_token.clone();
        let order = order.clone();
        let set_name = set_name.clone();
        async move {
            if let Some(token) = order.get(idx) {
                if let Some(Some(json)) = by_token.get(token) {
                    file.merge(json)?;
                }
            }
            match put(&store, &item_ctx, file, Some(&set_name)).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_already_exists() => Ok(()),
                Err(e) => Err(e),
            }
        }
    })
    .await
}
