//! Diff: the symmetric set difference of two stores' name listings (spec
//! section 4.4).

use crate::context::Context;
use crate::error::Result;
use crate::store::Store;
use std::collections::BTreeSet;

/// Two sorted listings: names only `source` has, and names only `dest` has.
/// Empty iff `source` and `dest` contain the same names.
pub struct DiffReport {
    pub source_only: Vec<String>,
    pub dest_only: Vec<String>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.source_only.is_empty() && self.dest_only.is_empty()
    }
}

pub async fn diff<A, B>(source: &A, dest: &B, ctx: &Context) -> Result<DiffReport>
where
    A: Store + ?Sized,
    B: Store + ?Sized,
{
    ctx.check()?;
    let source_names: BTreeSet<String> = source.search(ctx, "").await?.names().into_iter().collect();
    let dest_names: BTreeSet<String> = dest.search(ctx, "").await?.names().into_iter().collect();
    Ok(DiffReport {
        source_only: source_names.difference(&dest_names).cloned().collect(),
        dest_only: dest_names.difference(&source_names).cloned().collect(),
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
    async fn diff_of_identical_stores_is_empty() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = LocalDiskStore::new(src_dir.path()).await.unwrap();
        let dest = LocalDiskStore::new(dst_dir.path()).await.unwrap();
        let ctx = Context::new();

        let report = diff(&source, &dest, &ctx).await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn diff_reports_names_unique_to_each_side() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = LocalDiskStore::new(src_dir.path()).await.unwrap();
        let dest = LocalDiskStore::new(dst_dir.path()).await.unwrap();
        let ctx = Context::new();

        let file = File::from_body("stdin", Box::new(Cursor::new(b"test".to_vec())), chrono::Utc::now())
            .await
            .unwrap();
        put(&source, &ctx, file, None).await.unwrap();

        let report = diff(&source, &dest, &ctx).await.unwrap();
        assert!(!report.is_empty());
        assert_eq!(report.dest_only.len(), 0);
        assert_eq!(report.source_only.len(), 2);
    }
}
