//! Round-trip laws from spec section 8: name-prefixing is its own inverse
//! pair, and `IndexUpdate` applied to `Index`'s own output is a no-op.

use memorybox::context::Context;
use memorybox::file::{data_name_of, is_meta_name, meta_name_of, File};
use memorybox::ops::index::{index, index_update};
use memorybox::ops::put::put;
use memorybox::store::local::LocalDiskStore;
use proptest::prelude::*;
use std::io::Cursor;

fn arb_digest_name() -> impl Strategy<Value = String> {
    "[a-f0-9]{8,64}".prop_map(|hex| format!("{hex}-sha256"))
}

proptest! {
    #[test]
    fn meta_name_of_is_idempotent(name in arb_digest_name()) {
        let once = meta_name_of(&name);
        let twice = meta_name_of(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn data_name_of_undoes_meta_name_of(name in arb_digest_name()) {
        let wrapped = meta_name_of(&name);
        prop_assert_eq!(data_name_of(&wrapped), name.clone());
        prop_assert!(is_meta_name(&wrapped));
        prop_assert!(!is_meta_name(&name));
    }

    #[test]
    fn data_name_of_is_a_no_op_on_bare_names(name in arb_digest_name()) {
        prop_assert_eq!(data_name_of(&name), name);
    }
}

#[tokio::test]
async fn index_update_over_index_s_own_output_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalDiskStore::new(dir.path()).await.unwrap();
    let ctx = Context::new();

    for content in [&b"alpha"[..], &b"beta"[..], &b"gamma"[..]] {
        let file = File::from_body("stdin", Box::new(Cursor::new(content.to_vec())), chrono::Utc::now())
            .await
            .unwrap();
        put(&store, &ctx, file, None).await.unwrap();
    }

    let before = index(&store, &ctx, 4).await.unwrap();
    let mut joined = Vec::new();
    for line in &before {
        joined.extend_from_slice(line);
        joined.push(b'\n');
    }
    let reader = tokio::io::BufReader::new(Cursor::new(joined));
    index_update(&store, &ctx, 4, reader).await.unwrap();

    let mut after = index(&store, &ctx, 4).await.unwrap();
    let mut before_sorted = before;
    before_sorted.sort();
    after.sort();
    assert_eq!(before_sorted, after);
}
